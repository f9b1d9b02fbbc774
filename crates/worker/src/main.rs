use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jobflow::config::Config;
use jobflow::{db, telemetry, PgDriver, Worker, WorkerId};

mod handlers;
use handlers::build_events;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;
    telemetry::init(cfg.log_format);

    let worker_id = cfg.worker_id.clone().unwrap_or_else(WorkerId::generate);
    let options = cfg.worker_options();

    tracing::info!(
        worker_id = %worker_id,
        job_name = ?options.job_name,
        max_fails = options.max_fails,
        idle = ?options.idle,
        claim_timeout = ?options.claim_timeout,
        retry_backoff = options.retry_backoff.is_some(),
        migrate_on_startup = cfg.migrate_on_startup,
        "jobflow worker starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    // Ctrl-C only raises a flag; the loop listener sees it after the current job.
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested, finishing current job");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    let driver = Arc::new(PgDriver::new(pool, worker_id));
    let worker = Worker::new(driver, build_events(shutdown)).with_options(options);

    let summary = worker.run().await?;
    tracing::info!(?summary, "jobflow worker exited");

    Ok(())
}
