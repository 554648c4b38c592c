mod cli;
mod error;
mod present;
mod query;

use crate::cli::{Cli, Command, ListBlockArgs, ListBlocksArgs, ListCommand, ListTenantsArgs, QueryArgs};
use crate::error::{ErrorKind, Result};
use crate::present::Listing;
use blockscope_config::{Config, Overrides};
use blockscope_scan::{ScanOptions, WindowRange, inspect_block, scan_blocks};
use blockscope_storage::BlockReader;
use clap::Parser;
use exn::{OptionExt, ResultExt};
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::Path;
use std::process::ExitCode;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config_file = cli.config_file.as_deref();
    let outcome = match &cli.command {
        Command::List(ListCommand::Tenants(args)) => list_tenants(config_file, args).await,
        Command::List(ListCommand::Block(args)) => list_block(config_file, args).await,
        Command::List(ListCommand::Blocks(args)) => list_blocks(config_file, args).await,
        Command::Query(args) => query(args).await,
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %*err, "Command failed");
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

/// Load the configuration and connect to the backend it selects.
fn open(config_file: Option<&Path>, overrides: &Overrides) -> Result<(Config, BlockReader)> {
    let config = blockscope_config::load(config_file, overrides).or_raise(|| ErrorKind::Setup)?;
    let backend = blockscope_config::connect(&config.storage.trace).or_raise(|| ErrorKind::Setup)?;
    Ok((config, BlockReader::new(backend)))
}

fn window(config: &Config) -> Result<WindowRange> {
    let window = config.compactor.compaction.compaction_window;
    WindowRange::try_from(window).or_raise(|| ErrorKind::InvalidSetting(format!("window {window:?}")))
}

async fn list_tenants(config_file: Option<&Path>, args: &ListTenantsArgs) -> Result<()> {
    let (_, reader) = open(config_file, &args.backend.overrides())?;
    let tenants = reader.tenants().await.or_raise(|| ErrorKind::Tenants)?;
    let mut out = std::io::stdout().lock();
    present::write_tenants(&mut out, &tenants).or_raise(|| ErrorKind::Output)?;
    out.flush().or_raise(|| ErrorKind::Output)
}

async fn list_block(config_file: Option<&Path>, args: &ListBlockArgs) -> Result<()> {
    let (config, reader) = open(config_file, &args.overrides())?;
    let inspection = inspect_block(&reader, &args.tenant, args.block_id, window(&config)?)
        .await
        .or_raise(|| ErrorKind::Scan(args.tenant.clone()))?;
    let mut out = std::io::stdout().lock();
    present::write_inspection(&mut out, &inspection, OffsetDateTime::now_utc()).or_raise(|| ErrorKind::Output)?;
    out.flush().or_raise(|| ErrorKind::Output)
}

async fn list_blocks(config_file: Option<&Path>, args: &ListBlocksArgs) -> Result<()> {
    let (config, reader) = open(config_file, &args.overrides())?;
    let options = ScanOptions {
        window: window(&config)?,
        concurrency: NonZeroUsize::new(config.scan.concurrency)
            .ok_or_raise(|| ErrorKind::InvalidSetting("concurrency must be at least 1".to_string()))?,
    };
    let report = scan_blocks(&reader, &args.tenant, &options)
        .await
        .or_raise(|| ErrorKind::Scan(args.tenant.clone()))?;
    if !report.is_complete() {
        tracing::warn!(failed = report.failures.len(), "Some blocks could not be read");
    }
    let listing = Listing {
        include_compacted: args.include_compacted,
        window: options.window,
        now: OffsetDateTime::now_utc(),
    };
    let mut out = std::io::stdout().lock();
    present::write_report(&mut out, &report, &listing).or_raise(|| ErrorKind::Output)?;
    out.flush().or_raise(|| ErrorKind::Output)
}

async fn query(args: &QueryArgs) -> Result<()> {
    let trace = query::query_trace(&args.api_endpoint, &args.trace_id, args.org_id.as_deref()).await?;
    let pretty = serde_json::to_string_pretty(&trace).or_raise(|| ErrorKind::Output)?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "{pretty}").or_raise(|| ErrorKind::Output)
}
