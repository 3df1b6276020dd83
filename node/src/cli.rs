//! # CLI Interface
//!
//! Command-line arguments for `quadvote-node`, defined with `clap` derive.
//! Every `run` flag can also come from a `QUADVOTE_*` environment variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use quadvote_protocol::config::{DEFAULT_VOICE_CREDITS, NETWORK_ID_DEVNET};

/// QuadVote local voting node.
///
/// Holds one voter's identity, credit ledger and vote cart, and serves an
/// HTTP API for composing and committing quadratic votes against an
/// in-process devnet coordinator.
#[derive(Parser, Debug)]
#[command(
    name = "quadvote-node",
    about = "QuadVote local voting node",
    version,
    propagate_version = true
)]
pub struct QuadVoteCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node and serve the HTTP API.
    Run(RunArgs),
    /// Create the data directory and the voter identity, then exit.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Directory holding the session database. Created if missing.
    #[arg(long, short = 'd', env = "QUADVOTE_DATA_DIR", default_value = ".quadvote")]
    pub data_dir: PathBuf,

    /// Port for the HTTP API.
    #[arg(long, short = 'p', env = "QUADVOTE_PORT", default_value_t = 9750)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "QUADVOTE_METRICS_PORT", default_value_t = 9751)]
    pub metrics_port: u16,

    /// Network id the devnet coordinator reports. Network 1 is refused.
    #[arg(long, env = "QUADVOTE_NETWORK_ID", default_value_t = NETWORK_ID_DEVNET)]
    pub network_id: u64,

    /// Voice credits the devnet grants on sign-up.
    #[arg(long, env = "QUADVOTE_DEVNET_CREDITS", default_value_t = DEFAULT_VOICE_CREDITS)]
    pub devnet_credits: u64,

    /// Return reserved credits of intents that fail to publish.
    #[arg(long, env = "QUADVOTE_REFUND_ON_FAILURE")]
    pub refund_on_failure: bool,

    /// JSON file served at `/api/image`. Without it the catalog is empty.
    #[arg(long, env = "QUADVOTE_IMAGE_CATALOG")]
    pub image_catalog: Option<PathBuf>,

    /// Upper bound on each protocol call, in milliseconds.
    #[arg(long, env = "QUADVOTE_CALL_TIMEOUT_MS", default_value_t = 30_000)]
    pub call_timeout_ms: u64,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "QUADVOTE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to initialize.
    #[arg(long, short = 'd', env = "QUADVOTE_DATA_DIR", default_value = ".quadvote")]
    pub data_dir: PathBuf,
}
