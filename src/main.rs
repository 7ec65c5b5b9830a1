use log::info;

use laptime_analytics::cron_jobs::{register_cron_jobs, run_backfill};
use laptime_analytics::errors::Error;
use laptime_analytics::modules::helpers::config::Settings;
use laptime_analytics::modules::helpers::logging::setup_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env();
    setup_logging(&settings)?;

    // catch up before the first tick
    run_backfill(settings.database_url.clone()).await;

    let mut scheduler = register_cron_jobs(&settings).await?;
    info!(target: "main", "running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    scheduler.shutdown().await.map_err(|e| Error::Scheduler {
        message: format!("{:?}", e),
    })?;
    info!(target: "main", "stopped");

    Ok(())
}
