//! SkinSage background worker
//!
//! Hosts the schedule-driven jobs that run independently of request traffic.
//! Currently that is the presence reaper.

mod presence_reaper;

use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};

use skinsage_api::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env()?;
    let pool = skinsage_shared::db::create_pool(&config.database_url).await?;

    let stale_after = Duration::from_secs(config.presence_stale_after_secs);
    let sweep_every = Duration::from_secs(config.reaper_interval_secs);

    let sched = JobScheduler::new().await?;

    let reaper_pool = pool.clone();
    let reaper = Job::new_repeated_async(sweep_every, move |_id, _sched| {
        let pool = reaper_pool.clone();
        Box::pin(async move {
            presence_reaper::sweep_stale_experts(&pool, stale_after).await;
        })
    })?;
    sched.add(reaper).await?;

    sched.start().await?;
    tracing::info!(
        sweep_interval_secs = config.reaper_interval_secs,
        stale_after_secs = config.presence_stale_after_secs,
        "Presence reaper scheduled"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Worker shutting down");

    Ok(())
}
