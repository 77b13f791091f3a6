//! Backend lifecycle manager.
//!
//! Supervises the machine-translation backend so that every enabled language
//! has a loaded model. Starting a backend or adding a model means relaunching
//! the process with a new model list and polling the health probe until the
//! new set is served, which can take minutes. All of that happens off the
//! resolver's hot path: the resolver only reads the current state and skips
//! the backend while it is not `Ready`.

use crate::backend::client::{BackendClient, ProbeStatus};
use crate::error::{TranslationError, TranslationResult};
use crate::i18n::SOURCE_LANGUAGE;
use crate::retry::{with_retry, RetryConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::process::Stdio;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Starts and stops the backend process.
#[async_trait]
pub trait BackendLauncher: Send + Sync {
    /// Start the backend serving `languages` (source language included),
    /// replacing any instance this launcher started before.
    async fn launch(&self, languages: &[String]) -> Result<()>;

    /// Stop the instance started by this launcher, if any.
    async fn stop(&self) -> Result<()>;
}

/// Launches the backend as a child process.
///
/// `{languages}` in any argument is replaced with the comma-separated model
/// list, which is also exported as `LT_LOAD_ONLY`. The child is spawned with
/// `kill_on_drop`, so dropping the launcher terminates the backend even when
/// `stop` is never reached.
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: Mutex::new(None),
        }
    }

    /// Parse a whitespace-separated command line such as
    /// `libretranslate --host 127.0.0.1 --port 5000 --load-only {languages}`.
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    fn render_args(&self, languages: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{languages}", languages))
            .collect()
    }

    async fn stop_child(child: &mut Option<Child>) -> Result<()> {
        if let Some(mut running) = child.take() {
            running
                .start_kill()
                .context("Failed to signal translation backend")?;
            let status = running
                .wait()
                .await
                .context("Failed to wait for translation backend to exit")?;
            info!("Translation backend stopped ({})", status);
        }
        Ok(())
    }
}

#[async_trait]
impl BackendLauncher for CommandLauncher {
    async fn launch(&self, languages: &[String]) -> Result<()> {
        let mut child = self.child.lock().await;
        Self::stop_child(&mut child).await?;

        let joined = languages.join(",");
        let spawned = Command::new(&self.program)
            .args(self.render_args(&joined))
            .env("LT_LOAD_ONLY", &joined)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn translation backend '{}'", self.program))?;

        info!(
            "Launched translation backend '{}' (pid {:?}) with models [{}]",
            self.program,
            spawned.id(),
            joined
        );
        *child = Some(spawned);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        Self::stop_child(&mut child).await
    }
}

/// Lifecycle state of the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BackendState {
    Down,
    Starting,
    Ready { loaded: BTreeSet<String> },
    Failed { reason: String },
}

/// Snapshot returned by `BackendManager::status`.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub state: BackendState,
    pub loaded_languages: Vec<String>,
    pub uptime_secs: Option<u64>,
}

struct Snapshot {
    state: BackendState,
    loaded: BTreeSet<String>,
    ready_since: Option<Instant>,
}

pub struct BackendManager {
    client: BackendClient,
    launcher: Arc<dyn BackendLauncher>,
    startup: RetryConfig,
    snapshot: RwLock<Snapshot>,
    transition: Mutex<()>,
}

impl BackendManager {
    pub fn new(
        client: BackendClient,
        launcher: Arc<dyn BackendLauncher>,
        startup: RetryConfig,
    ) -> Self {
        Self {
            client,
            launcher,
            startup,
            snapshot: RwLock::new(Snapshot {
                state: BackendState::Down,
                loaded: BTreeSet::new(),
                ready_since: None,
            }),
            transition: Mutex::new(()),
        }
    }

    /// Non-blocking readiness check used by the resolver.
    pub fn is_ready(&self) -> bool {
        matches!(self.read().state, BackendState::Ready { .. })
    }

    /// Whether a model for `code` is loaded. The source language always is.
    pub fn serves(&self, code: &str) -> bool {
        code == SOURCE_LANGUAGE || self.read().loaded.contains(code)
    }

    pub fn status(&self) -> BackendStatus {
        let snapshot = self.read();
        BackendStatus {
            state: snapshot.state.clone(),
            loaded_languages: snapshot.loaded.iter().cloned().collect(),
            uptime_secs: snapshot.ready_since.map(|since| since.elapsed().as_secs()),
        }
    }

    /// Make sure the backend is running with models for every code in `enabled`.
    ///
    /// Returns immediately when already `Ready` with a superset loaded. From
    /// `Down` or `Failed`, an already-running backend that serves everything
    /// is adopted without a relaunch.
    pub async fn ensure_running(&self, enabled: &[String]) -> TranslationResult<BackendStatus> {
        let _guard = self.transition.lock().await;
        self.converge(wanted_models(enabled)).await?;
        Ok(self.status())
    }

    /// Load a model for `code` on top of every language in `enabled`.
    ///
    /// Returns `true` if the backend was relaunched and `false` if the
    /// models were already loaded or a running backend was adopted.
    pub async fn add_language(&self, code: &str, enabled: &[String]) -> TranslationResult<bool> {
        let _guard = self.transition.lock().await;
        let mut wanted = wanted_models(enabled);
        if code != SOURCE_LANGUAGE {
            wanted.insert(code.to_string());
        }
        self.converge(wanted).await
    }

    /// Caller holds `transition`. Relaunches with `loaded ∪ wanted` unless
    /// the current or an adoptable backend already serves `wanted`.
    async fn converge(&self, wanted: BTreeSet<String>) -> TranslationResult<bool> {
        let (state, loaded) = {
            let snapshot = self.read();
            (snapshot.state.clone(), snapshot.loaded.clone())
        };
        let ready = matches!(state, BackendState::Ready { .. });

        if ready && loaded.is_superset(&wanted) {
            return Ok(false);
        }

        if !ready {
            let target = wanted.iter().next().map(String::as_str);
            if let ProbeStatus::Ready { languages } = self.client.probe(target).await {
                let served: BTreeSet<String> = languages
                    .into_iter()
                    .filter(|code| code.as_str() != SOURCE_LANGUAGE)
                    .collect();
                if served.is_superset(&wanted) {
                    info!("✓ Adopted running translation backend serving {:?}", served);
                    self.mark_ready(served);
                    return Ok(false);
                }
            }
        }

        let union: BTreeSet<String> = loaded.union(&wanted).cloned().collect();
        self.reconfigure(union).await?;
        Ok(true)
    }

    /// Start the backend in the background unless a transition is running.
    pub fn request_start(self: &Arc<Self>, enabled: Vec<String>) {
        if self.transition.try_lock().is_err() {
            return;
        }
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = manager.ensure_running(&enabled).await {
                warn!("Background backend start failed: {}", e);
            }
        });
    }

    /// Stop the backend process and mark the manager `Down`.
    pub async fn shutdown(&self) -> Result<()> {
        let _guard = self.transition.lock().await;
        self.launcher.stop().await?;
        let mut snapshot = self.write();
        snapshot.state = BackendState::Down;
        snapshot.ready_since = None;
        Ok(())
    }

    async fn reconfigure(&self, wanted: BTreeSet<String>) -> TranslationResult<()> {
        self.write().state = BackendState::Starting;

        let mut models = vec![SOURCE_LANGUAGE.to_string()];
        models.extend(wanted.iter().cloned());
        info!("Starting translation backend with models {:?}", models);

        if let Err(e) = self.launcher.launch(&models).await {
            let reason = format!("{:#}", e);
            error!("Failed to launch translation backend: {}", reason);
            self.mark_failed(&reason);
            return Err(TranslationError::BackendUnavailable(reason));
        }

        let probe_target = wanted.iter().next().cloned();
        let result = with_retry(&self.startup, "Translation backend startup", || {
            let client = self.client.clone();
            let probe_target = probe_target.clone();
            let wanted = wanted.clone();
            async move {
                match client.probe(probe_target.as_deref()).await {
                    ProbeStatus::Ready { languages } => {
                        let missing: Vec<&String> =
                            wanted.iter().filter(|code| !languages.contains(code)).collect();
                        if missing.is_empty() {
                            Ok(())
                        } else {
                            Err(format!("models not loaded yet: {:?}", missing))
                        }
                    }
                    ProbeStatus::NotReady { reason } => Err(reason),
                }
            }
        })
        .await;

        match result {
            Ok(()) => {
                info!("✓ Translation backend ready with {:?}", wanted);
                self.mark_ready(wanted);
                Ok(())
            }
            Err(reason) => {
                error!("Translation backend did not become ready: {}", reason);
                self.mark_failed(&reason);
                Err(TranslationError::BackendUnavailable(reason))
            }
        }
    }

    fn mark_ready(&self, loaded: BTreeSet<String>) {
        let mut snapshot = self.write();
        snapshot.state = BackendState::Ready {
            loaded: loaded.clone(),
        };
        snapshot.loaded = loaded;
        snapshot.ready_since = Some(Instant::now());
    }

    fn mark_failed(&self, reason: &str) {
        let mut snapshot = self.write();
        snapshot.state = BackendState::Failed {
            reason: reason.to_string(),
        };
        snapshot.ready_since = None;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Snapshot> {
        self.snapshot.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn wanted_models(enabled: &[String]) -> BTreeSet<String> {
    enabled
        .iter()
        .filter(|code| code.as_str() != SOURCE_LANGUAGE)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    /// Records launches instead of spawning anything.
    #[derive(Default)]
    struct RecordingLauncher {
        launches: std::sync::Mutex<Vec<Vec<String>>>,
        stops: std::sync::atomic::AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl BackendLauncher for RecordingLauncher {
        async fn launch(&self, languages: &[String]) -> Result<()> {
            if self.fail {
                anyhow::bail!("docker not installed");
            }
            self.launches.lock().unwrap().push(languages.to_vec());
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.stops.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    fn languages_body(codes: &[&str]) -> serde_json::Value {
        serde_json::Value::Array(
            codes
                .iter()
                .map(|c| serde_json::json!({ "code": c }))
                .collect(),
        )
    }

    async fn mount_translate_ok(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "translatedText": "ok" })),
            )
            .mount(server)
            .await;
    }

    fn manager_for(server_uri: &str, launcher: Arc<RecordingLauncher>) -> BackendManager {
        let client = BackendClient::new(server_uri, Duration::from_millis(500)).unwrap();
        let startup = RetryConfig::polling(Duration::from_millis(200), Duration::from_millis(20));
        BackendManager::new(client, launcher, startup)
    }

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    // ==================== State Tests ====================

    #[tokio::test]
    async fn test_initial_state_is_down() {
        let manager = manager_for("http://127.0.0.1:9", Arc::new(RecordingLauncher::default()));

        assert!(!manager.is_ready());
        assert_eq!(manager.status().state, BackendState::Down);
        assert!(manager.serves("en"));
        assert!(!manager.serves("fr"));
    }

    #[tokio::test]
    async fn test_ensure_running_adopts_existing_backend() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(languages_body(&["en", "fr"])))
            .mount(&server)
            .await;
        mount_translate_ok(&server).await;

        let launcher = Arc::new(RecordingLauncher::default());
        let manager = manager_for(&server.uri(), launcher.clone());

        let status = manager.ensure_running(&codes(&["en", "fr"])).await.unwrap();
        assert_eq!(status.loaded_languages, codes(&["fr"]));
        assert!(manager.is_ready());
        assert!(launcher.launches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_language_relaunches_with_union() {
        let server = MockServer::start().await;
        // First probe sees only fr; after the relaunch ja is served too
        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(languages_body(&["en", "fr"])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(languages_body(&["en", "fr", "ja"])),
            )
            .mount(&server)
            .await;
        mount_translate_ok(&server).await;

        let launcher = Arc::new(RecordingLauncher::default());
        let manager = manager_for(&server.uri(), launcher.clone());
        manager.ensure_running(&codes(&["en", "fr"])).await.unwrap();

        let recompiled = manager
            .add_language("ja", &codes(&["en", "fr", "ja"]))
            .await
            .unwrap();
        assert!(recompiled);
        assert_eq!(
            *launcher.launches.lock().unwrap(),
            vec![codes(&["en", "fr", "ja"])]
        );
        assert_eq!(manager.status().loaded_languages, codes(&["fr", "ja"]));
        assert!(manager.serves("ja"));

        // Second add is a no-op
        assert!(!manager
            .add_language("ja", &codes(&["en", "fr", "ja"]))
            .await
            .unwrap());
        assert_eq!(launcher.launches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_language_from_down_keeps_enabled_models() {
        let server = MockServer::start().await;
        // Nothing is running yet; after the launch every model is served
        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(languages_body(&["en", "fr", "ja"])),
            )
            .mount(&server)
            .await;
        mount_translate_ok(&server).await;

        let launcher = Arc::new(RecordingLauncher::default());
        let manager = manager_for(&server.uri(), launcher.clone());

        let recompiled = manager
            .add_language("ja", &codes(&["en", "fr", "ja"]))
            .await
            .unwrap();
        assert!(recompiled);
        assert_eq!(
            *launcher.launches.lock().unwrap(),
            vec![codes(&["en", "fr", "ja"])]
        );
        assert!(manager.serves("fr"));
        assert!(manager.serves("ja"));
    }

    #[tokio::test]
    async fn test_add_language_from_down_adopts_running_backend() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(languages_body(&["en", "fr", "ja"])),
            )
            .mount(&server)
            .await;
        mount_translate_ok(&server).await;

        let launcher = Arc::new(RecordingLauncher::default());
        let manager = manager_for(&server.uri(), launcher.clone());

        let recompiled = manager.add_language("ja", &codes(&["en", "fr"])).await.unwrap();
        assert!(!recompiled);
        assert!(launcher.launches.lock().unwrap().is_empty());
        assert_eq!(manager.status().loaded_languages, codes(&["fr", "ja"]));
    }

    #[tokio::test]
    async fn test_startup_deadline_marks_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let launcher = Arc::new(RecordingLauncher::default());
        let manager = manager_for(&server.uri(), launcher.clone());

        let result = manager.ensure_running(&codes(&["en", "de"])).await;
        assert!(matches!(result, Err(TranslationError::BackendUnavailable(_))));
        assert!(matches!(manager.status().state, BackendState::Failed { .. }));
        assert_eq!(launcher.launches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_marks_failed() {
        let launcher = Arc::new(RecordingLauncher {
            fail: true,
            ..Default::default()
        });
        let manager = manager_for("http://127.0.0.1:9", launcher);

        let result = manager.add_language("de", &codes(&["en", "de"])).await;
        assert!(result.is_err());
        match manager.status().state {
            BackendState::Failed { reason } => assert!(reason.contains("docker")),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_launcher() {
        let launcher = Arc::new(RecordingLauncher::default());
        let manager = manager_for("http://127.0.0.1:9", launcher.clone());

        manager.shutdown().await.unwrap();
        assert_eq!(launcher.stops.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(manager.status().state, BackendState::Down);
    }

    // ==================== CommandLauncher Tests ====================

    #[test]
    fn test_command_line_parsing() {
        let launcher =
            CommandLauncher::from_command_line("libretranslate --port 5000 --load-only {languages}")
                .unwrap();
        assert_eq!(launcher.program, "libretranslate");
        assert_eq!(
            launcher.render_args("en,fr"),
            codes(&["--port", "5000", "--load-only", "en,fr"])
        );
    }

    #[test]
    fn test_empty_command_line() {
        assert!(CommandLauncher::from_command_line("   ").is_none());
    }

    #[tokio::test]
    async fn test_command_launcher_spawn_failure() {
        let launcher = CommandLauncher::new("definitely-not-a-real-binary-xyz", vec![]);
        let result = launcher.launch(&codes(&["en"])).await;
        assert!(result.is_err());
        assert!(launcher.stop().await.is_ok());
    }
}
