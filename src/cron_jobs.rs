use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::errors::{CustomResult, Error};
use crate::modules::helpers::config::Settings;
use crate::modules::maintenance::{recalculate_all, MaintenanceReport, RecalculationScope};
use crate::modules::models::general::establish_connection;

fn scheduler_error(error: JobSchedulerError) -> Error {
    Error::Scheduler {
        message: format!("{:?}", error),
    }
}

/// recalculate every session whose cached statistics are missing or outdated
pub fn backfill_outdated(database_url: &str) -> CustomResult<MaintenanceReport> {
    let conn = &mut establish_connection(database_url)?;
    recalculate_all(conn, RecalculationScope::OutdatedOnly, false)
}

/// run the backfill on the blocking pool, it holds its own connection
pub async fn run_backfill(database_url: String) {
    match tokio::task::spawn_blocking(move || backfill_outdated(&database_url)).await {
        Ok(Ok(report)) => {
            info!(
                target: "cron_jobs:run_backfill",
                "backfill done. ({} recalculated, {} failed)",
                report.recalculated(),
                report.failed()
            );
        }
        Ok(Err(err)) => {
            error!(target: "cron_jobs:run_backfill", "backfill failed. (error: {})", err);
        }
        Err(err) => {
            error!(target: "cron_jobs:run_backfill", "backfill task panicked. (error: {})", err);
        }
    }
}

/// # register cron jobs
/// start a scheduler that runs the outdated-only backfill every
/// `backfill_interval`
///
/// ## Arguments
/// * `settings` - the settings holding the database url and interval
///
/// ## Returns
/// * `JobScheduler` - the running scheduler, shut it down on exit
pub async fn register_cron_jobs(settings: &Settings) -> CustomResult<JobScheduler> {
    let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;

    let database_url = settings.database_url.clone();
    let job = Job::new_repeated_async(settings.backfill_interval, move |_uuid, _l| {
        let database_url = database_url.clone();
        Box::pin(async move {
            run_backfill(database_url).await;
        })
    })
    .map_err(scheduler_error)?;

    scheduler.add(job).await.map_err(scheduler_error)?;
    scheduler.start().await.map_err(scheduler_error)?;

    info!(
        target: "cron_jobs:register_cron_jobs",
        "backfill scheduled every {} seconds",
        settings.backfill_interval.as_secs()
    );
    Ok(scheduler)
}
