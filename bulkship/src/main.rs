mod config;

use clap::{Args, Parser, Subcommand};
use config::{CommonConfig, Config, ConfigError};
use fulfillment::gateway::Session;
use fulfillment::{FulfillmentServiceError, report};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const METRICS_PREFIX: &str = "bulkship";

#[derive(Parser)]
#[command(name = "bulkship", about = "Bulk order fulfillment from spreadsheets")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the fulfillment API and the admin listener
    Serve(ServeArgs),
    /// Fulfill the orders of one local spreadsheet and write the report
    Fulfill(FulfillArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

#[derive(Args)]
struct FulfillArgs {
    #[arg(long)]
    config_file_path: PathBuf,

    /// Shop domain, e.g. example.myshopify.com
    #[arg(long)]
    shop: String,

    #[arg(long, env = "BULKSHIP_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    /// Spreadsheet to process (.xlsx, .xls or .csv)
    #[arg(long)]
    file: PathBuf,

    /// Where to write the xlsx report
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not start runtime: {0}")]
    Runtime(std::io::Error),
    #[error("invalid sentry dsn: {0}")]
    Sentry(String),
    #[error("could not install metrics: {0}")]
    Metrics(#[from] shared::metrics::MetricsInitError),
    #[error(transparent)]
    Fulfillment(#[from] FulfillmentServiceError),
    #[error("could not write report: {0}")]
    Report(String),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli_main(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn cli_main(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        CliCommand::Serve(args) => {
            let config = Config::from_file(&args.config_file_path)?;
            let _sentry = init_observability(&config.common)?;

            tracing::info!(
                host = %config.fulfillment.listener.host,
                port = config.fulfillment.listener.port,
                "starting fulfillment service"
            );
            runtime()?.block_on(fulfillment::run(config.fulfillment))?;
        }
        CliCommand::Fulfill(args) => {
            let config = Config::from_file(&args.config_file_path)?;
            let _sentry = init_observability(&config.common)?;

            let session = Session {
                shop: args.shop,
                access_token: args.access_token,
            };
            let report = runtime()?.block_on(fulfillment::fulfill_file(
                &config.fulfillment,
                &session,
                &args.file,
            ))?;

            let stats = report::summarize(&report);
            println!(
                "total: {}, success: {}, failed: {}",
                stats.total, stats.success, stats.failed
            );

            if let Some(output) = args.output {
                let body = report::render(&report).map_err(|e| CliError::Report(e.to_string()))?;
                std::fs::write(&output, body).map_err(|e| CliError::Report(e.to_string()))?;
                println!("report written to {}", output.display());
            }
        }
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}

/// Installs the log subscriber, the Sentry client and the StatsD exporter
/// as configured. The returned guard flushes Sentry events when dropped.
fn init_observability(common: &CommonConfig) -> Result<Option<sentry::ClientInitGuard>, CliError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let sentry_guard = match &common.logging {
        Some(logging) => {
            let dsn: sentry::types::Dsn = logging
                .sentry_dsn
                .parse()
                .map_err(|e| CliError::Sentry(format!("{e}")))?;

            Some(sentry::init(sentry::ClientOptions {
                dsn: Some(dsn),
                release: sentry::release_name!(),
                ..Default::default()
            }))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(
            sentry_guard
                .is_some()
                .then(sentry::integrations::tracing::layer),
        )
        .init();

    if let Some(metrics) = &common.metrics {
        shared::metrics::init_statsd(&metrics.statsd_host, metrics.statsd_port, METRICS_PREFIX)?;
    }

    Ok(sentry_guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_fulfill_args() {
        let cli = Cli::try_parse_from([
            "bulkship",
            "fulfill",
            "--config-file-path",
            "bulkship.yaml",
            "--shop",
            "example.myshopify.com",
            "--access-token",
            "shpat_test",
            "--file",
            "orders.xlsx",
        ])
        .unwrap();

        let CliCommand::Fulfill(args) = cli.command else {
            panic!("expected fulfill");
        };
        assert_eq!(args.shop, "example.myshopify.com");
        assert_eq!(args.file, PathBuf::from("orders.xlsx"));
        assert!(args.output.is_none());
    }
}
