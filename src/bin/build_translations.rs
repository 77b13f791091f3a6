//! Build translations binary - precomputes the prebuilt store ahead of deploys
//!
//! Usage:
//!   cargo run --bin build-translations                    # Rebuild every enabled language
//!   cargo run --bin build-translations -- --lang fr       # Rebuild one language
//!   cargo run --bin build-translations -- --remove fr     # Drop a language from the store
//!
//! Uses the same environment variables as the service. With BACKEND_COMMAND
//! set, the backend is started (and stopped again) around the build.
//! Prints the resulting build metadata as JSON.

use anyhow::{bail, Context, Result};
use storefront_translations::config::Config;
use storefront_translations::service::TranslationService;
use tracing::{info, warn};

enum Command {
    All,
    Language(String),
    Remove(String),
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args {
        [] => Ok(Command::All),
        [flag, code] if flag == "--lang" => Ok(Command::Language(code.to_lowercase())),
        [flag, code] if flag == "--remove" => Ok(Command::Remove(code.to_lowercase())),
        _ => bail!("Usage: build-translations [--lang <code> | --remove <code>]"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("storefront_translations=info".parse()?)
                .add_directive("build_translations=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    let config = Config::from_env()?;
    let service = TranslationService::from_config(&config).await?;

    if let Command::Remove(code) = &command {
        let change = service.disable_language(code).await;
        if !change.ok {
            bail!(
                "Cannot remove '{}': {}",
                code,
                change.reason.unwrap_or_default()
            );
        }
        let metadata = service
            .builder()
            .store()
            .load()
            .await
            .metadata
            .context("Store has no metadata after removal")?;
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    if let Some(manager) = service.manager() {
        info!("Starting translation backend");
        if let Err(e) = manager.ensure_running(&service.registry().enabled_codes()).await {
            warn!("Backend not ready, building from the dictionary only: {}", e);
        }
    }

    let result = match &command {
        Command::Language(code) => service.build_for_language(code).await,
        _ => service.build_all().await,
    };
    service.shutdown().await?;

    let report = result?;
    info!(
        "✓ Build complete: {} from backend, {} from dictionary, {} copied from source",
        report.backend_translations, report.fallback_translations, report.source_copies
    );
    println!("{}", serde_json::to_string_pretty(&report.metadata)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        assert!(matches!(parse_args(&[]).unwrap(), Command::All));
        assert!(matches!(
            parse_args(&args(&["--lang", "FR"])).unwrap(),
            Command::Language(code) if code == "fr"
        ));
        assert!(matches!(
            parse_args(&args(&["--remove", "de"])).unwrap(),
            Command::Remove(code) if code == "de"
        ));
        assert!(parse_args(&args(&["--lang"])).is_err());
        assert!(parse_args(&args(&["--bogus", "x"])).is_err());
    }
}
