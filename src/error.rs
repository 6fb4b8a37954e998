//! Error types for the edge node
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - HTTP status mapping for the request path
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Request errors (3xx)
    RequestDecode = 300,

    // Function errors (4xx)
    FunctionNotFound = 400,
    CompileFailed = 401,
    InstantiationFailed = 402,
    ExportNotFound = 403,
    ExecutionFault = 404,
    ExecutionTimeout = 405,

    // Network errors (5xx)
    DiscoveryStartup = 500,
    GossipStartup = 501,
    ListenerStartup = 502,
    Broadcast = 510,

    // Client connection errors (6xx)
    ConnectionFailed = 600,
    DeployRejected = 601,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Request errors
            400..=499 => 40, // Function errors
            500..=599 => 50, // Network errors
            600..=699 => 60, // Client errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the node
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // ─────────────────────────────────────────────────────────────
    // Request Errors
    // ─────────────────────────────────────────────────────────────

    /// Malformed JSON body or invalid base64 payload
    #[error("Invalid request: {message}")]
    Decode { message: String },

    // ─────────────────────────────────────────────────────────────
    // Function Errors
    // ─────────────────────────────────────────────────────────────

    /// No function registered under this name
    #[error("function not found: {name}")]
    FunctionNotFound { name: String },

    /// Bytecode failed to compile
    #[error("failed to compile function {name}: {message}")]
    Compile { name: String, message: String },

    /// Module failed to instantiate
    #[error("failed to instantiate function {name}: {message}")]
    Instantiation { name: String, message: String },

    /// The module has no export with the requested name
    #[error("export not found: {name}")]
    ExportNotFound { name: String },

    /// Trap or fault while the export was running
    #[error("execution of {name} failed: {message}")]
    ExecutionFault { name: String, message: String },

    /// Execution ran past the configured deadline
    #[error("execution of {name} exceeded {timeout_ms}ms deadline")]
    ExecutionTimeout { name: String, timeout_ms: u64 },

    // ─────────────────────────────────────────────────────────────
    // Network Errors
    // ─────────────────────────────────────────────────────────────

    /// mDNS advertisement could not be started
    #[error("Discovery startup failed: {message}")]
    DiscoveryStartup { message: String },

    /// Gossip overlay could not be joined
    #[error("Gossip startup failed during {stage}: {message}")]
    GossipStartup { stage: String, message: String },

    /// HTTP listener could not be bound
    #[error("Failed to bind HTTP listener on {addr}")]
    ListenerStartup {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Publishing to the gossip topic failed (e.g. no subscribed peers)
    #[error("Broadcast failed: {message}")]
    Broadcast { message: String },

    // ─────────────────────────────────────────────────────────────
    // Client Errors
    // ─────────────────────────────────────────────────────────────

    /// Deploy client could not reach the node
    #[error("Failed to connect to {url}: {message}")]
    ConnectionFailed { url: String, message: String },

    /// Node answered the deploy with a non-200 status
    #[error("deploy failed: {status}")]
    DeployRejected { status: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,

            Error::Decode { .. } => ErrorCode::RequestDecode,

            Error::FunctionNotFound { .. } => ErrorCode::FunctionNotFound,
            Error::Compile { .. } => ErrorCode::CompileFailed,
            Error::Instantiation { .. } => ErrorCode::InstantiationFailed,
            Error::ExportNotFound { .. } => ErrorCode::ExportNotFound,
            Error::ExecutionFault { .. } => ErrorCode::ExecutionFault,
            Error::ExecutionTimeout { .. } => ErrorCode::ExecutionTimeout,

            Error::DiscoveryStartup { .. } => ErrorCode::DiscoveryStartup,
            Error::GossipStartup { .. } => ErrorCode::GossipStartup,
            Error::ListenerStartup { .. } => ErrorCode::ListenerStartup,
            Error::Broadcast { .. } => ErrorCode::Broadcast,

            Error::ConnectionFailed { .. } => ErrorCode::ConnectionFailed,
            Error::DeployRejected { .. } => ErrorCode::DeployRejected,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// HTTP status for errors surfaced by the request handlers.
    ///
    /// Decode failures are the caller's fault; everything else that can
    /// happen while serving a request is reported as a server error.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Error::Decode { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if the error is fatal (node should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::DiscoveryStartup { .. }
                | Error::GossipStartup { .. }
                | Error::ListenerStartup { .. }
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'edge-node config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'edge-node config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),

            Error::DiscoveryStartup { .. } => Some(
                "mDNS needs multicast on UDP port 5353. Check that no firewall blocks it."
            ),
            Error::GossipStartup { .. } => Some(
                "Check that the gossip listen port is free, or set [gossip] listen_port = 0."
            ),
            Error::ListenerStartup { .. } => Some(
                "Another process may already use this port. Pick another with --port."
            ),

            Error::ConnectionFailed { .. } => Some(
                "Check that the node is running and that --addr points at it."
            ),

            Error::ExecutionTimeout { .. } => Some(
                "Raise [execution] timeout_ms or make the function terminate sooner."
            ),

            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        let code = self.code();
        format!("[{}] {}", code.as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound { path: path.into() }
    }

    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a request decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Error::Decode {
            message: message.into(),
        }
    }

    /// Create a function not found error
    pub fn function_not_found(name: impl Into<String>) -> Self {
        Error::FunctionNotFound { name: name.into() }
    }

    /// Create an execution fault
    pub fn execution_fault(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ExecutionFault {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a gossip startup error for the given stage
    pub fn gossip_startup(stage: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::GossipStartup {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    /// Create a connection failed error
    pub fn connection_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConnectionFailed {
            url: url.into(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::FunctionNotFound.as_str(), "E400");
        assert_eq!(ErrorCode::InternalError.as_str(), "E900");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigNotFound.exit_code(), 10);
        assert_eq!(ErrorCode::IoRead.exit_code(), 20);
        assert_eq!(ErrorCode::RequestDecode.exit_code(), 30);
        assert_eq!(ErrorCode::ExecutionFault.exit_code(), 40);
        assert_eq!(ErrorCode::GossipStartup.exit_code(), 50);
        assert_eq!(ErrorCode::ConnectionFailed.exit_code(), 60);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_error_display() {
        let err = Error::config_not_found("/path/to/config.toml");
        assert!(err.to_string().contains("/path/to/config.toml"));

        let err = Error::function_not_found("missing");
        assert_eq!(err.to_string(), "function not found: missing");
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(Error::decode("bad json").http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::function_not_found("x").http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::execution_fault("x", "unreachable").http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_fatal() {
        assert!(Error::config_not_found("/test").is_fatal());
        assert!(Error::gossip_startup("topic subscription", "boom").is_fatal());
        assert!(!Error::function_not_found("x").is_fatal());
        assert!(!Error::decode("x").is_fatal());
    }

    #[test]
    fn test_gossip_startup_names_stage() {
        let err = Error::gossip_startup("overlay join", "no transport");
        assert!(err.to_string().contains("overlay join"));
        assert_eq!(err.code(), ErrorCode::GossipStartup);
    }

    #[test]
    fn test_error_suggestions() {
        let err = Error::config_not_found("/test");
        assert!(err.suggestion().unwrap().contains("config init"));

        let err = Error::ListenerStartup {
            addr: "0.0.0.0:8080".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.suggestion().unwrap().contains("--port"));
    }

    #[test]
    fn test_format_for_terminal() {
        let err = Error::config_not_found("/test/config.toml");
        let formatted = err.format_for_terminal();

        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("Hint"));
    }

    #[test]
    fn test_format_for_log() {
        let err = Error::function_not_found("double");
        let formatted = err.format_for_log();

        assert!(formatted.contains("[E400]"));
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        assert_eq!(err.code(), ErrorCode::IoNotFound);
    }
}
