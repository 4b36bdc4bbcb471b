//! Environment loading and service wiring for the binary entrypoint.

use std::sync::Arc;

use cartage_config::Settings;
use cartage_pipeline::PipelineService;
use cartage_telemetry::{GlobalContextGuard, LoggingConfig, init_logging};
use cartage_toolchain::{BoostxCli, CarCli, ShellSubmitter};
use tracing::info;

use crate::error::{AppError, AppResult};

/// Entry point for the application boot sequence.
///
/// Loads settings from the environment, installs logging, runs one pipeline
/// cycle, and reports its terminal outcome. Stage failures surface as logged
/// outcomes, not as a non-zero exit.
///
/// # Errors
///
/// Returns an error if settings cannot be loaded or logging cannot be
/// installed.
pub async fn run_app() -> AppResult<()> {
    dotenv::dotenv().ok();
    let settings =
        cartage_config::from_env().map_err(|err| AppError::config("settings.load", err))?;
    init_logging(&LoggingConfig::default())
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("pipeline");

    info!(
        server_id = %settings.server_id,
        source = %settings.source_dir.display(),
        target = %settings.target_dir.display(),
        "cartage pipeline starting"
    );
    let service = build_service(settings);
    let outcome = service.run().await;
    info!(outcome = outcome.label(), "cartage pipeline finished");
    Ok(())
}

/// Wire the production toolchain implementations into the pipeline service.
fn build_service(settings: Settings) -> PipelineService {
    let containerizer = Arc::new(CarCli::new(settings.car_binary.clone()));
    PipelineService::new(
        settings,
        containerizer,
        Arc::new(BoostxCli::default()),
        Arc::new(ShellSubmitter),
    )
}
