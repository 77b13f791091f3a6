use crate::config::Config;
use crate::error::TranslationError;
use crate::service::TranslationService;
use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Hourly, on the hour.
const SWEEP_SCHEDULE: &str = "0 0 * * * *";

/// Initialize and start the scheduler
///
/// Always sweeps expired runtime translations; rebuilds everything on
/// `REBUILD_SCHEDULE` when it is set.
pub async fn start_scheduler(
    service: Arc<TranslationService>,
    config: &Config,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let sweep_service = Arc::clone(&service);
    let sweep = Job::new_async(SWEEP_SCHEDULE, move |_uuid, _l| {
        let service = Arc::clone(&sweep_service);
        Box::pin(async move {
            service.sweep();
        })
    })?;
    scheduler.add(sweep).await?;

    if let Some(schedule) = &config.rebuild_schedule {
        info!("Scheduling translation rebuilds (cron: {})", schedule);

        let rebuild_service = Arc::clone(&service);
        let rebuild = Job::new_async(schedule.as_str(), move |_uuid, _l| {
            let service = Arc::clone(&rebuild_service);
            Box::pin(async move {
                info!("⏰ Scheduled rebuild triggered");
                run_rebuild_job(&service).await;
            })
        })?;
        scheduler.add(rebuild).await?;
    }

    scheduler.start().await?;
    info!("✓ Scheduler started");

    Ok(scheduler)
}

async fn run_rebuild_job(service: &TranslationService) {
    match service.build_all().await {
        Ok(report) => info!(
            "✓ Scheduled rebuild complete: {} languages, {}% efficiency",
            report.languages.len(),
            report.metadata.efficiency
        ),
        Err(TranslationError::BuildInProgress) => {
            warn!("Skipping scheduled rebuild: another build is running")
        }
        Err(e) => error!("Scheduled rebuild failed: {}", e),
    }
}
