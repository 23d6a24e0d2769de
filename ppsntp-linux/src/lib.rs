pub mod clock;
pub mod config;
pub mod gpio;
pub mod observer;
pub mod setup;
pub mod shm;

use tracing::level_filters::LevelFilter;

/// Route both `tracing` events and the `log` records of the `ppsntp` core to
/// stdout
pub fn setup_logger(level: LevelFilter) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_log::LogTracer::init()?;

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
