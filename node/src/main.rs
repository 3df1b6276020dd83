// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # QuadVote Node
//!
//! Entry point for the `quadvote-node` binary. Parses CLI arguments,
//! initializes logging and metrics, restores the voter session from disk
//! and serves the HTTP API.
//!
//! - `run`     start the node against an in-process devnet coordinator
//! - `init`    create the data directory and voter identity
//! - `version` print build version information

mod api;
mod cli;
mod images;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use quadvote_protocol::config::NETWORK_ID_MAINNET;
use quadvote_protocol::identity::Identity;
use quadvote_protocol::{
    CommitPipeline, DevnetCoordinator, KeyValueStore, PipelineConfig, RefundPolicy, VoterDB,
};

use cli::{Commands, QuadVoteCli};
use images::ImageCatalog;
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = QuadVoteCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

fn open_db(data_dir: &Path) -> Result<VoterDB> {
    let db_path = data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = VoterDB::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");
    Ok(db)
}

async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        logging::DEFAULT_FILTER,
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        port = args.port,
        metrics_port = args.metrics_port,
        network_id = args.network_id,
        data_dir = %args.data_dir.display(),
        "starting quadvote-node"
    );

    let db = Arc::new(open_db(&args.data_dir)?);
    let devnet = Arc::new(DevnetCoordinator::with_settings(
        args.network_id,
        args.devnet_credits,
    ));
    let config = PipelineConfig {
        disallowed_network_id: NETWORK_ID_MAINNET,
        call_timeout: Duration::from_millis(args.call_timeout_ms),
        refund_policy: if args.refund_on_failure {
            RefundPolicy::RefundOnFailure
        } else {
            RefundPolicy::ChargeOnReserve
        },
    };
    let pipeline = Arc::new(
        CommitPipeline::open(config, db.clone(), devnet.clone(), devnet)
            .context("failed to restore voter session")?,
    );

    let images = Arc::new(ImageCatalog::load(args.image_catalog.as_deref())?);

    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    node_metrics.observe(&pipeline);

    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network_id: args.network_id,
        pipeline,
        metrics: Arc::clone(&node_metrics),
        images,
    };

    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    db.flush().context("failed to flush database")?;
    tracing::info!("quadvote-node stopped");
    Ok(())
}

/// Creates the data directory and the voter identity if they do not exist.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("quadvote_node=info,quadvote_protocol=info", LogFormat::Pretty);

    let db = open_db(&args.data_dir)?;
    let identity = Identity::create(&db).context("failed to create voter identity")?;
    db.flush().context("failed to flush database")?;

    println!("Node initialized.");
    println!("  Data directory : {}", args.data_dir.display());
    println!("  Public key     : {}", identity.public_key());

    Ok(())
}

fn print_version() {
    println!("quadvote-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc         {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT or SIGTERM. Only Ctrl+C on non-Unix platforms.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
