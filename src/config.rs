//! Configuration system for the edge node
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (EDGE_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Main node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP listener and identity
    pub node: NodeSettings,

    /// Local network advertisement
    pub discovery: DiscoverySettings,

    /// Gossip overlay
    pub gossip: GossipSettings,

    /// WebAssembly execution
    pub execution: ExecutionSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Node identity and listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// HTTP port for deploy/exec/metrics
    pub port: u16,

    /// Address the HTTP listener binds to
    pub bind_address: String,

    /// Instance name advertised over mDNS (defaults to the host name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// mDNS discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Fully qualified service type
    pub service_type: String,

    /// How long a peer lookup collects responses, in milliseconds
    pub lookup_window_ms: u64,
}

/// Gossip overlay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipSettings {
    /// Topic that deployed bytecode is published on
    pub topic: String,

    /// TCP listen port for overlay connections (0 = auto-assign)
    pub listen_port: u16,

    /// Gossipsub heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u64,

    /// Idle overlay connections are closed after this many seconds
    pub idle_connection_timeout_secs: u64,
}

/// Execution engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Per-call deadline in milliseconds (0 = unlimited)
    pub timeout_ms: u64,

    /// Async runtime worker threads (0 = auto)
    pub worker_threads: u32,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            name: None,
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            service_type: crate::discovery::SERVICE_TYPE.to_string(),
            lookup_window_ms: 2000,
        }
    }
}

impl Default for GossipSettings {
    fn default() -> Self {
        Self {
            topic: crate::gossip::FUNCTION_TOPIC.to_string(),
            listen_port: 0,
            heartbeat_interval_ms: 1000,
            idle_connection_timeout_secs: 60,
        }
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 0, // Unlimited
            worker_threads: 0,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl DiscoverySettings {
    pub fn lookup_window(&self) -> Duration {
        Duration::from_millis(self.lookup_window_ms)
    }
}

impl ExecutionSettings {
    /// Deadline for a single call, if one is configured
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl NodeConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        let config_file = Self::find_config_file(config_path)?;
        if let Some(path) = config_file {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: format!("{}: {}", path.display(), e.message()),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            // Current directory
            PathBuf::from("edge-node.toml"),
            PathBuf::from("config.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("edge-node").join("node.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".edge-node").join("node.toml"))
                .unwrap_or_default(),
            // System config (Linux)
            PathBuf::from("/etc/edge-node/node.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Node settings
        if let Ok(val) = std::env::var("EDGE_PORT") {
            if let Ok(n) = val.parse() {
                self.node.port = n;
            }
        }
        if let Ok(val) = std::env::var("EDGE_BIND_ADDRESS") {
            self.node.bind_address = val;
        }
        if let Ok(val) = std::env::var("EDGE_NODE_NAME") {
            self.node.name = Some(val);
        }

        // Discovery settings
        if let Ok(val) = std::env::var("EDGE_SERVICE_TYPE") {
            self.discovery.service_type = val;
        }
        if let Ok(val) = std::env::var("EDGE_LOOKUP_WINDOW_MS") {
            if let Ok(n) = val.parse() {
                self.discovery.lookup_window_ms = n;
            }
        }

        // Gossip settings
        if let Ok(val) = std::env::var("EDGE_GOSSIP_TOPIC") {
            self.gossip.topic = val;
        }
        if let Ok(val) = std::env::var("EDGE_GOSSIP_PORT") {
            if let Ok(n) = val.parse() {
                self.gossip.listen_port = n;
            }
        }

        // Execution settings
        if let Ok(val) = std::env::var("EDGE_EXEC_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.execution.timeout_ms = n;
            }
        }
        if let Ok(val) = std::env::var("EDGE_WORKER_THREADS") {
            if let Ok(n) = val.parse() {
                self.execution.worker_threads = n;
            }
        }

        // Logging settings
        if let Ok(val) = std::env::var("EDGE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("EDGE_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("EDGE_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.node.port == 0 {
            return Err(Error::config_field_invalid(
                "node.port",
                "HTTP port must be between 1 and 65535",
            ));
        }
        if self.node.bind_address.parse::<std::net::IpAddr>().is_err() {
            return Err(Error::config_field_invalid(
                "node.bind_address",
                format!("'{}' is not an IP address", self.node.bind_address),
            ));
        }

        // mdns-sd rejects anything that is not a fully qualified .local. name
        if !self.discovery.service_type.starts_with('_')
            || !self.discovery.service_type.ends_with(".local.")
        {
            return Err(Error::config_field_invalid(
                "discovery.service_type",
                format!(
                    "'{}' must look like _name._tcp.local.",
                    self.discovery.service_type
                ),
            ));
        }
        if self.discovery.lookup_window_ms == 0 {
            return Err(Error::config_field_invalid(
                "discovery.lookup_window_ms",
                "lookup window must be greater than zero",
            ));
        }

        if self.gossip.topic.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "gossip.topic",
                "gossip topic cannot be empty",
            ));
        }
        if self.gossip.heartbeat_interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "gossip.heartbeat_interval_ms",
                "heartbeat interval must be greater than zero",
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Instance name advertised over mDNS
    pub fn instance_name(&self) -> String {
        self.node.name.clone().unwrap_or_else(host_name)
    }
}

/// Host name of this machine, falling back to a fixed name
pub fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "edge-node".to_string())
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<()> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".edge-node")
                .join("node.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::config_validation(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    println!("Configuration file created: {}", config_path.display());
    Ok(())
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# Edge Node Configuration

[node]
# HTTP port serving /deploy, /exec and /metrics
port = 8080

# Address the HTTP listener binds to
bind_address = "0.0.0.0"

# Instance name advertised over mDNS (defaults to the host name)
# name = "edge-01"

[discovery]
# Service type advertised and queried on the local network
service_type = "_edge-node._tcp.local."

# How long a peer lookup collects responses (milliseconds)
lookup_window_ms = 2000

[gossip]
# Topic that deployed bytecode is published on
topic = "edge-node/functions"

# TCP port for overlay connections (0 = auto-assign)
listen_port = 0

# Gossipsub heartbeat interval (milliseconds)
heartbeat_interval_ms = 1000

# Close idle overlay connections after this many seconds
idle_connection_timeout_secs = 60

[execution]
# Per-call deadline in milliseconds (0 = unlimited)
timeout_ms = 0

# Async runtime worker threads (0 = auto-detect)
worker_threads = 0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.edge-node/logs/node.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
