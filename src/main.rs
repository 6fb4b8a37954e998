//! Edge Node - WebAssembly functions on the local network
//!
//! Entry point for the `edge-node` binary. A node advertises itself over
//! mDNS, joins a gossip overlay, and serves deploy/exec/metrics over HTTP.

mod agent;
mod cli;
mod client;
mod config;
mod discovery;
mod error;
mod gossip;
mod logging;
mod version;
mod wasm;

use std::path::Path;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::Agent;
use crate::cli::{Cli, Commands, ConfigSubcommand};
use crate::client::DeployClient;
use crate::config::NodeConfig;
use crate::error::{Error, Result};

fn main() {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        if e.is_fatal() {
            tracing::error!(error = %e.format_for_log(), "Node failed to start");
        }
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            handle_config_command(subcommand)
        }
        Commands::Deploy { wasm, name, addr } => {
            logging::init_simple(simple_level(cli.verbose, cli.quiet))?;
            current_thread_runtime()?.block_on(deploy(&wasm, &name, &addr))
        }
        Commands::Peers { window_ms } => {
            logging::init_simple(simple_level(cli.verbose, cli.quiet))?;
            let mut config = NodeConfig::load(None)?;
            if let Some(window_ms) = window_ms {
                config.discovery.lookup_window_ms = window_ms;
            }
            current_thread_runtime()?.block_on(list_peers(config))
        }
        Commands::Run { port, config } => {
            let mut config = NodeConfig::load(config.as_deref())?;
            if let Some(port) = port {
                config.node.port = port;
                config.validate()?;
            }

            // The guards must be kept alive for the lifetime of the program
            let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

            let build = version::build_info();
            info!(
                version = %build.full_version(),
                target = %build.target,
                profile = %build.profile,
                "Starting edge node"
            );

            run_node(config)
        }
    }
}

fn simple_level(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::WARN,
        (false, 1) => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    }
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create runtime: {}", e)))
}

/// Run the node until Ctrl-C
fn run_node(config: NodeConfig) -> Result<()> {
    info!(
        port = config.node.port,
        bind_address = %config.node.bind_address,
        instance = %config.instance_name(),
        timeout_ms = config.execution.timeout_ms,
        "Configuration loaded"
    );

    let worker_threads = if config.execution.worker_threads > 0 {
        config.execution.worker_threads as usize
    } else {
        num_cpus::get()
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(worker_threads)
        .thread_name("edge-node")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async {
        let agent = Agent::new(config)?;
        agent::cancel_on_ctrl_c(agent.token());
        agent.run().await
    })
}

async fn deploy(wasm: &Path, name: &str, addr: &str) -> Result<()> {
    let bytecode = tokio::fs::read(wasm).await.map_err(|e| Error::IoRead {
        path: wasm.to_path_buf(),
        source: e,
    })?;

    let client = DeployClient::new(addr)?;
    client.deploy(name, &bytecode).await?;
    println!("Deployed {} ({} bytes) to {}", name, bytecode.len(), client.deploy_url());
    Ok(())
}

async fn list_peers(config: NodeConfig) -> Result<()> {
    let token = CancellationToken::new();
    agent::cancel_on_ctrl_c(token.clone());
    let peers = discovery::enumerate(&config.discovery, &token).await?;

    if peers.is_empty() {
        println!("No nodes found.");
    }
    for peer in peers {
        println!("{}", peer);
    }
    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = NodeConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            config::init_config(path.as_deref(), force)?;
        }
        ConfigSubcommand::Validate { config } => {
            NodeConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
