// Sweep runner
//
// Connects to Postgres, applies migrations and periodically runs the point
// accrual sweep and the maintenance sweep until interrupted.

use mockable::{Clock, DefaultClock};
use std::error::Error;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use salon_booking::booking::{PgStore, TracingNotifier};
use salon_booking::{db, BookingCoordinator, Config, CoordinatorSettings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Salon booking sweeper - Starting...");

    let config = Config::from_env()?;
    let database_url = config.require_database_url()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let coordinator = BookingCoordinator::new(
        Arc::new(PgStore::new(pool.clone())),
        CoordinatorSettings::from(&config),
        Arc::new(TracingNotifier),
        clock.clone(),
    );

    let mut interval = tokio::time::interval(config.sweep_interval);
    tracing::info!(
        interval_secs = config.sweep_interval.as_secs(),
        "Sweeper is running"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = clock.utc();

                match coordinator.run_accrual_sweep(now).await {
                    Ok(report) if !report.failures.is_empty() => tracing::warn!(
                        failed = report.failures.len(),
                        "Some accrual tasks were not applied"
                    ),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Accrual sweep failed"),
                }

                if let Err(e) = coordinator.run_maintenance_sweep(now).await {
                    tracing::error!(error = %e, "Maintenance sweep failed");
                }

                coordinator.metrics().log_summary();
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, stopping sweeper");
                break;
            }
        }
    }

    pool.close().await;
    tracing::info!("Database connections closed");
    Ok(())
}
