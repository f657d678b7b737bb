// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # linkchain Node
//!
//! Entry point for the `linkchain-node` binary. Parses CLI arguments,
//! initializes logging, opens the chain, and either runs a one-shot command
//! or serves the HTTP API and metrics.
//!
//! - `init`: create the data directory and the genesis block
//! - `add`: append a block
//! - `get`: print one block
//! - `height`: print the tip height
//! - `print`: print a range of blocks
//! - `validate`: check one block or the whole chain
//! - `serve`: run the HTTP API and metrics endpoint
//! - `version`: print build version information
//!
//! Command output goes to stdout as JSON; logs go to stderr.

mod api;
mod cli;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use linkchain_protocol::config::ChainConfig;
use linkchain_protocol::crypto::Hasher;
use linkchain_protocol::storage::{ChainEngine, SledStore};

use api::NodeEngine;
use cli::{ChainArgs, Commands, LinkchainCli};
use logging::Verbosity;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LinkchainCli::parse();

    let verbosity = match cli.command {
        Commands::Serve(_) => Verbosity::Server,
        Commands::Init | Commands::Add(_) => Verbosity::Writer,
        _ => Verbosity::Reader,
    };
    logging::init_logging(verbosity, cli.chain.log_format);

    match cli.command {
        Commands::Init => init_chain(&cli.chain),
        Commands::Add(args) => add_block(&cli.chain, args),
        Commands::Get(args) => {
            let engine = open_chain(&cli.chain)?;
            let block = engine.get_block(args.height)?;
            println!("{}", serde_json::to_string_pretty(&block)?);
            Ok(())
        }
        Commands::Height => {
            let engine = open_chain(&cli.chain)?;
            match engine.height()? {
                Some(h) => println!("{h}"),
                None => println!("empty"),
            }
            Ok(())
        }
        Commands::Print(args) => print_chain(&cli.chain, args),
        Commands::Validate(args) => validate(&cli.chain, args),
        Commands::Serve(args) => serve(&cli.chain, args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Opening a chain
// ---------------------------------------------------------------------------

/// Merge the config file (if any) with flag and environment overrides.
fn resolve_config(args: &ChainArgs) -> Result<ChainConfig> {
    let mut cfg = match &args.config {
        Some(path) => ChainConfig::load(path)?,
        None => ChainConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        cfg.data_dir = dir.clone();
    }
    if let Some(algorithm) = args.hash_algorithm {
        cfg.hash_algorithm = algorithm;
    }
    if args.sequential {
        cfg.parallel_validation = false;
    }
    Ok(cfg)
}

/// Open (or create) the chain described by `args`.
///
/// Without an explicit `--hash` or config file, an existing chain is opened
/// with the algorithm it was created with.
fn open_chain(args: &ChainArgs) -> Result<NodeEngine> {
    let mut cfg = resolve_config(args)?;

    std::fs::create_dir_all(&cfg.data_dir).with_context(|| {
        format!("failed to create data directory: {}", cfg.data_dir.display())
    })?;
    let store = SledStore::open(&cfg.data_dir)
        .with_context(|| format!("failed to open chain at {}", cfg.data_dir.display()))?;

    if args.hash_algorithm.is_none() && args.config.is_none() {
        if let Some(stored) = store.hash_algorithm()? {
            cfg.hash_algorithm = stored;
        }
    }
    store
        .ensure_hash_algorithm(cfg.hash_algorithm)
        .with_context(|| format!("cannot open chain at {}", cfg.data_dir.display()))?;

    tracing::debug!(
        data_dir = %cfg.data_dir.display(),
        algorithm = %cfg.hash_algorithm,
        parallel_validation = cfg.parallel_validation,
        "chain opened"
    );

    Ok(ChainEngine::new(store, cfg.hash_algorithm)
        .with_parallel_validation(cfg.parallel_validation)
        .with_flush_on_append(cfg.flush_on_append))
}

// ---------------------------------------------------------------------------
// One-shot commands
// ---------------------------------------------------------------------------

/// Creates the genesis block if the chain is empty.
fn init_chain(args: &ChainArgs) -> Result<()> {
    let engine = open_chain(args)?;
    match engine.bootstrap()? {
        Some(genesis) => {
            println!("Chain initialized.");
            println!("  Algorithm    : {}", engine.hasher().algorithm());
            println!("  Genesis hash : {}", genesis.hash);
        }
        None => {
            let tip = engine.height()?.unwrap_or_default();
            println!("Chain already initialized (height {tip}).");
        }
    }
    Ok(())
}

/// Appends one block, bootstrapping genesis first on an empty chain.
fn add_block(args: &ChainArgs, add: cli::AddArgs) -> Result<()> {
    let engine = open_chain(args)?;
    if engine.bootstrap()?.is_some() {
        tracing::info!("empty chain, genesis created");
    }
    let block = engine
        .append(add.payload)
        .context("append failed; retry if another writer was active")?;
    println!("{}", serde_json::to_string_pretty(&block)?);
    Ok(())
}

/// Prints blocks `from..=to`, one compact JSON object per line.
fn print_chain(args: &ChainArgs, print: cli::PrintArgs) -> Result<()> {
    let engine = open_chain(args)?;
    let Some(tip) = engine.height()? else {
        return Ok(());
    };
    let to = print.to.unwrap_or(tip);
    if print.from > to {
        bail!("--from {} is past --to {}", print.from, to);
    }
    for block in engine.blocks(print.from..=to)? {
        println!("{}", serde_json::to_string(&block)?);
    }
    Ok(())
}

/// Validates one height or the whole chain. Any failure is a non-zero exit.
fn validate(args: &ChainArgs, validate: cli::ValidateArgs) -> Result<()> {
    let engine = open_chain(args)?;

    if let Some(height) = validate.height {
        let failure = engine.check_block(height)?;
        println!(
            "{}",
            serde_json::json!({
                "height": height,
                "valid": failure.is_none(),
                "failure": failure,
            })
        );
        if let Some(kind) = failure {
            bail!("block {height} failed validation: {kind:?}");
        }
        return Ok(());
    }

    let report = engine.validate_chain()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_valid() {
        bail!(
            "chain failed validation at {} of {} heights",
            report.failures.len(),
            report.checked
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Serves the REST API and the Prometheus endpoint until shutdown.
async fn serve(args: &ChainArgs, serve: cli::ServeArgs) -> Result<()> {
    let engine = Arc::new(open_chain(args)?);
    if engine.bootstrap()?.is_some() {
        tracing::info!("genesis block created");
    }

    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.set_height(engine.height()?);

    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            linkchain_protocol::config::PROTOCOL_VERSION,
        ),
        engine,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", serve.bind, serve.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", serve.bind, serve.metrics_port);
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

    tracing::info!("linkchain-node stopped");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("linkchain-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol       {}", linkchain_protocol::config::PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
