//! Logging infrastructure using tracing + tracing-subscriber
//!
//! Console output (compact or JSON), an optional rolling log file, and
//! level selection from config, `-v`/`-q` flags, or `RUST_LOG`.

use std::fs;
use std::path::Path;

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::error::{Error, Result};

/// Dependencies that log every packet or compilation step below warn
const NOISY_TARGETS: &[&str] = &[
    "hyper",
    "libp2p_gossipsub",
    "libp2p_mdns",
    "libp2p_swarm",
    "libp2p_tcp",
    "multistream_select",
    "yamux",
    "mdns_sd",
    "wasmtime",
    "cranelift_codegen",
];

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Keeps the non-blocking file writer alive; dropping it flushes the file.
pub struct LogGuards {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the logging system
///
/// The returned guards must live until the process exits.
pub fn init_logging(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Result<LogGuards> {
    let level = determine_level(settings, verbose, quiet);
    let env_filter = build_env_filter(level)?;

    let console_layer = console_layer(settings.json_format);

    let (file_layer, file_guard) = match settings.file.as_deref() {
        Some(log_file) => {
            let (writer, guard) = file_writer(log_file, settings.max_file_size_mb, settings.max_files)?;
            (Some(file_layer(writer, settings.json_format)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to initialize logging: {}", e)))?;

    tracing::info!(
        level = %level,
        file = ?settings.file,
        json = settings.json_format,
        "Logging initialized"
    );

    Ok(LogGuards {
        _file_guard: file_guard,
    })
}

/// Minimal console logging for short-lived commands
pub fn init_simple(level: Level) -> Result<()> {
    tracing_subscriber::registry()
        .with(build_env_filter(level)?)
        .with(fmt::layer().compact().with_target(false))
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to initialize logging: {}", e)))
}

/// CLI flags win over the configured level
fn determine_level(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => parse_level(&settings.level),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// RUST_LOG, when set, replaces the base level; our crate and the noisy
/// dependencies always get explicit directives on top.
fn build_env_filter(level: Level) -> Result<EnvFilter> {
    let base = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let filter = base.add_directive(parse_directive(&format!("edge_node={}", level))?);

    NOISY_TARGETS.iter().try_fold(filter, |f, target| {
        parse_directive(&format!("{}=warn", target)).map(|d| f.add_directive(d))
    })
}

fn parse_directive(directive: &str) -> Result<Directive> {
    directive.parse().map_err(|e| {
        Error::config_validation(format!("Invalid log directive '{}': {}", directive, e))
    })
}

fn console_layer<S>(json_format: bool) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    if json_format {
        Box::new(
            fmt::layer()
                .json()
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        )
    } else {
        Box::new(fmt::layer().with_target(true).with_ansi(true).compact())
    }
}

fn file_layer<S>(writer: NonBlocking, json_format: bool) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json_format {
        Box::new(layer.json().with_span_events(FmtSpan::CLOSE))
    } else {
        Box::new(layer)
    }
}

/// Rolling appender behind a non-blocking writer
///
/// tracing-appender only rotates on time, so small size limits map to
/// hourly rotation and everything else to daily.
fn file_writer(log_file: &str, max_size_mb: u64, max_files: u32) -> Result<(NonBlocking, WorkerGuard)> {
    let path = Path::new(log_file);
    let directory = path.parent().unwrap_or(Path::new("."));

    fs::create_dir_all(directory).map_err(|e| Error::IoWrite {
        path: directory.to_path_buf(),
        source: e,
    })?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("node.log");

    let rotation = if max_size_mb > 0 && max_size_mb < 10 {
        Rotation::HOURLY
    } else {
        Rotation::DAILY
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(file_name)
        .filename_suffix("log")
        .max_log_files(max_files.max(1) as usize)
        .build(directory)
        .map_err(|e| {
            Error::config_validation(format!("Failed to create log file appender: {}", e))
        })?;

    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("invalid"), Level::INFO);
    }

    #[test]
    fn test_determine_level_flags() {
        let settings = LoggingSettings::default();
        assert_eq!(determine_level(&settings, 0, true), Level::ERROR);
        assert_eq!(determine_level(&settings, 0, false), Level::INFO);
        assert_eq!(determine_level(&settings, 1, false), Level::DEBUG);
        assert_eq!(determine_level(&settings, 3, false), Level::TRACE);
    }

    #[test]
    fn test_determine_level_from_settings() {
        let settings = LoggingSettings {
            level: "warn".to_string(),
            ..Default::default()
        };
        assert_eq!(determine_level(&settings, 0, false), Level::WARN);
        // quiet still wins over a configured level
        assert_eq!(determine_level(&settings, 2, true), Level::ERROR);
    }

    #[test]
    fn test_build_env_filter_quiets_dependencies() {
        let filter = build_env_filter(Level::DEBUG).unwrap();
        let rendered = filter.to_string().to_lowercase();
        assert!(rendered.contains("edge_node=debug"));
        assert!(rendered.contains("libp2p_gossipsub=warn"));
        assert!(rendered.contains("wasmtime=warn"));
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("logs").join("node.log");

        let result = file_writer(log_path.to_str().unwrap(), 100, 5);

        assert!(result.is_ok());
        assert!(temp_dir.path().join("logs").exists());
    }
}
