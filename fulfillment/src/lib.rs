pub mod api;
pub mod config;
pub mod engine;
pub mod errors;
pub mod gateway;
pub mod metrics_defs;
pub mod normalizer;
pub mod orchestrator;
pub mod report;
mod retry;
pub mod settings;
pub mod store;
#[cfg(test)]
mod testutils;
pub mod tracking;
pub mod types;

use api::AppState;
use config::Config;
use engine::DecisionEngine;
use errors::{BatchError, ParseError};
use gateway::{GatewayFactory, Session, ShopifyGatewayFactory};
use normalizer::FileFormat;
use orchestrator::BatchOrchestrator;
use settings::{SettingsStore, TenantSettings};
use shared::admin_service::admin_router;
use shared::http::{bind, run_http_service};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use store::{InMemoryReportStore, ReportStore};
use tracking::TrackingUrlResolver;
use types::Report;

#[derive(thiserror::Error, Debug)]
pub enum FulfillmentServiceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Config(#[from] config::ValidationError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// Serves the fulfillment API and the admin listener until either fails.
pub async fn run(config: Config) -> Result<(), FulfillmentServiceError> {
    config.validate()?;

    let state = build_state(&config);

    let ready = Arc::new(AtomicBool::new(false));
    let probe = ready.clone();
    let admin_app = admin_router(move || probe.load(Ordering::Relaxed));

    let api_listener = bind(&config.listener.host, config.listener.port).await?;
    let admin_listener = bind(&config.admin_listener.host, config.admin_listener.port).await?;
    ready.store(true, Ordering::Relaxed);

    tokio::try_join!(
        run_http_service(api_listener, api::router(state)),
        run_http_service(admin_listener, admin_app),
    )?;

    Ok(())
}

fn build_state(config: &Config) -> AppState {
    let reports: Arc<dyn ReportStore> = Arc::new(InMemoryReportStore::new());

    AppState {
        orchestrator: Arc::new(BatchOrchestrator::new(config.batch.clone(), reports.clone())),
        reports,
        settings: Arc::new(SettingsStore::new(TenantSettings::from(&config.tracking))),
        gateways: Arc::new(ShopifyGatewayFactory::new(
            config.platform.clone(),
            config.retry.clone(),
        )),
        upload: config.upload.clone(),
    }
}

/// Runs one batch from a spreadsheet on disk, outside the HTTP server.
/// Carrier defaults come from the configuration.
pub async fn fulfill_file(
    config: &Config,
    session: &Session,
    path: &Path,
) -> Result<Arc<Report>, FulfillmentServiceError> {
    config.validate()?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let format = FileFormat::from_file_name(&file_name)?;
    let bytes = tokio::fs::read(path).await?;

    let settings = TenantSettings::from(&config.tracking);
    let records = normalizer::parse(&bytes, format, &settings.default_tracking_company)?;

    let factory = ShopifyGatewayFactory::new(config.platform.clone(), config.retry.clone());
    let engine = Arc::new(DecisionEngine::new(
        factory.for_session(session),
        TrackingUrlResolver::from_settings(&settings),
    ));

    let orchestrator =
        BatchOrchestrator::new(config.batch.clone(), Arc::new(InMemoryReportStore::new()));
    let report = orchestrator.run(&session.shop, records, engine).await?;

    Ok(report)
}
