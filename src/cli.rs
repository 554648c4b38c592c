//! Command-line interface.

use blockscope_config::Overrides;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "blockscope", version, about = "Inspect block metadata in trace storage backends")]
pub struct Cli {
    /// Path to a configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long, global = true)]
    pub config_file: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List blocks stored in a backend
    #[command(subcommand)]
    List(ListCommand),
    /// Fetch a trace from a running query API
    Query(QueryArgs),
}

#[derive(Debug, Subcommand)]
pub enum ListCommand {
    /// List the tenants that have blocks in a backend
    Tenants(ListTenantsArgs),
    /// List information about a block
    Block(ListBlockArgs),
    /// List information about all blocks of a tenant
    Blocks(ListBlocksArgs),
}

/// Backend options; each one overrides the configuration file.
#[derive(Debug, Default, Args)]
pub struct BackendArgs {
    /// Backend to connect to
    #[arg(long, value_parser = ["local", "s3", "gcs"])]
    pub backend: Option<String>,

    /// Bucket to scan (the directory for the local backend)
    #[arg(long)]
    pub bucket: Option<String>,

    /// S3 endpoint, e.g. s3.dualstack.us-east-2.amazonaws.com
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// S3 access key id
    #[arg(long)]
    pub s3_user: Option<String>,

    /// S3 secret access key
    #[arg(long, env = "BLOCKSCOPE_S3_PASS", hide_env_values = true)]
    pub s3_pass: Option<String>,
}
impl BackendArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            backend: self.backend.clone(),
            bucket: self.bucket.clone(),
            s3_endpoint: self.s3_endpoint.clone(),
            s3_access_key: self.s3_user.clone(),
            s3_secret_key: self.s3_pass.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct ListTenantsArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
}

#[derive(Debug, Args)]
pub struct ListBlockArgs {
    pub tenant: String,
    pub block_id: Uuid,

    /// Compaction window, e.g. "1h" or "30m"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub window: Option<Duration>,

    #[command(flatten)]
    pub backend: BackendArgs,
}
impl ListBlockArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            compaction_window: self.window,
            ..self.backend.overrides()
        }
    }
}

#[derive(Debug, Args)]
pub struct ListBlocksArgs {
    pub tenant: String,

    /// Also show blocks that have been compacted away
    #[arg(long)]
    pub include_compacted: bool,

    /// Number of blocks fetched at the same time
    #[arg(long)]
    pub concurrency: Option<NonZeroUsize>,

    /// Compaction window, e.g. "1h" or "30m"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub window: Option<Duration>,

    #[command(flatten)]
    pub backend: BackendArgs,
}
impl ListBlocksArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            compaction_window: self.window,
            concurrency: self.concurrency.map(NonZeroUsize::get),
            ..self.backend.overrides()
        }
    }
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Base URL of the query API, e.g. http://localhost:3200
    pub api_endpoint: String,
    pub trace_id: String,

    /// Tenant to query, sent as the X-Scope-OrgID header
    #[arg(long)]
    pub org_id: Option<String>,
}
