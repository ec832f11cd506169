use metrics_exporter_statsd::{StatsdBuilder, StatsdError};

#[derive(thiserror::Error, Debug)]
pub enum MetricsInitError {
    #[error("could not build statsd recorder: {0}")]
    Statsd(#[from] StatsdError),
    #[error("a metrics recorder is already installed")]
    AlreadyInstalled,
}

/// Installs a StatsD exporter as the global `metrics` recorder.
///
/// Without a call to this function every metric emitted through the
/// `counter!`/`histogram!` macros is discarded.
pub fn init_statsd(statsd_host: &str, statsd_port: u16, prefix: &str) -> Result<(), MetricsInitError> {
    let recorder = StatsdBuilder::from(statsd_host, statsd_port).build(Some(prefix))?;

    metrics::set_global_recorder(recorder).map_err(|_| MetricsInitError::AlreadyInstalled)?;
    tracing::info!(host = statsd_host, port = statsd_port, "statsd metrics enabled");

    Ok(())
}
