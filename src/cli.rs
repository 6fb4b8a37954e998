//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the edge node.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::client::DEFAULT_NODE_ADDR;

/// Edge Node - run WebAssembly functions on the local network
///
/// Nodes advertise themselves over mDNS, accept function deployments over
/// HTTP, execute them in a sandbox, and gossip deployed bytecode to peers.
#[derive(Parser, Debug)]
#[command(name = "edge-node")]
#[command(author, version, long_about = None)]
#[command(about = "Edge Node - run WebAssembly functions on the local network")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a node (advertise, join the overlay, serve HTTP)
    Run {
        /// HTTP port, overriding the configuration
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to configuration file
        #[arg(short, long, env = "EDGE_CONFIG")]
        config: Option<String>,
    },

    /// Deploy a wasm file to a running node
    Deploy {
        /// Path to the .wasm file
        #[arg(short, long)]
        wasm: PathBuf,

        /// Function name; must match the export to call
        #[arg(short, long)]
        name: String,

        /// Node address
        #[arg(short, long, default_value = DEFAULT_NODE_ADDR)]
        addr: String,
    },

    /// List nodes advertising on the local network
    Peers {
        /// How long to collect responses, in milliseconds
        #[arg(short, long)]
        window_ms: Option<u64>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_about_names_the_node() {
        let about = Cli::command().get_about().map(|a| a.to_string());
        assert_eq!(
            about.as_deref(),
            Some("Edge Node - run WebAssembly functions on the local network")
        );
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::parse_from(["edge-node", "run"]);
        match cli.command {
            Commands::Run { port, config } => {
                assert!(port.is_none());
                assert!(config.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_with_port_and_config() {
        let cli = Cli::parse_from(["edge-node", "run", "--port", "9090", "-c", "/etc/node.toml"]);
        match cli.command {
            Commands::Run { port, config } => {
                assert_eq!(port, Some(9090));
                assert_eq!(config, Some("/etc/node.toml".to_string()));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_deploy_default_addr() {
        let cli = Cli::parse_from(["edge-node", "deploy", "--wasm", "f.wasm", "--name", "double"]);
        match cli.command {
            Commands::Deploy { wasm, name, addr } => {
                assert_eq!(wasm, PathBuf::from("f.wasm"));
                assert_eq!(name, "double");
                assert_eq!(addr, "http://localhost:8080");
            }
            _ => panic!("Expected Deploy command"),
        }
    }

    #[test]
    fn test_deploy_requires_name() {
        assert!(Cli::try_parse_from(["edge-node", "deploy", "--wasm", "f.wasm"]).is_err());
    }

    #[test]
    fn test_peers_window() {
        let cli = Cli::parse_from(["edge-node", "peers", "--window-ms", "500"]);
        match cli.command {
            Commands::Peers { window_ms } => assert_eq!(window_ms, Some(500)),
            _ => panic!("Expected Peers command"),
        }
    }

    #[test]
    fn test_verbose_flags() {
        let cli = Cli::parse_from(["edge-node", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_quiet_flag() {
        let cli = Cli::parse_from(["edge-node", "--quiet", "version"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["edge-node", "config", "init", "--force"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
