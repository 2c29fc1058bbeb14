//! Tracing setup for scout402
//!
//! All terminal output goes to stderr; stdout belongs to the MCP channel.
//! - Verbosity: default (WARN), verbose (INFO), debug, quiet (ERROR), silent (off)
//! - Pretty, JSON or compact terminal format
//! - Optional log file at DEBUG level regardless of terminal level

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

const CRATE_TARGETS: &[&str] = &["scout402", "mcp", "mcp-client", "x402-pay", "pipeline"];

#[derive(Clone, Debug, Default, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Colored human-readable output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
    /// Compact single-line format
    Compact,
}

#[derive(Default)]
pub struct TracingConfig {
    pub verbose: bool,
    pub debug: bool,
    pub quiet: bool,
    pub silent: bool,
    pub format: LogFormat,
    /// Writes DEBUG+ regardless of terminal level
    pub log_file: Option<PathBuf>,
}

impl TracingConfig {
    /// None when terminal output is off
    fn terminal_level(&self) -> Option<Level> {
        if self.silent {
            None
        } else if self.quiet {
            Some(Level::ERROR)
        } else if self.debug {
            // DEBUG is compiled out in release (release_max_level_info)
            if cfg!(debug_assertions) { Some(Level::DEBUG) } else { Some(Level::INFO) }
        } else if self.verbose {
            Some(Level::INFO)
        } else {
            Some(Level::WARN)
        }
    }

    fn cli_level_specified(&self) -> bool {
        self.verbose || self.debug || self.quiet || self.silent
    }
}

/// Filter directives: `level` for this crate's targets, `warn` for dependencies
fn filter_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    let mut directives: Vec<String> = CRATE_TARGETS.iter().map(|t| format!("{}={}", t, level)).collect();
    directives.push("warn".to_string());
    directives.join(",")
}

/// CLI flags win over RUST_LOG; RUST_LOG wins over the default level
fn make_filter(level: Level, cli_specified: bool) -> EnvFilter {
    if cli_specified {
        EnvFilter::new(filter_directives(level))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(level)))
    }
}

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn make_terminal_layer(format: &LogFormat, filter: EnvFilter) -> BoxedLayer {
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed(),
    }
}

fn make_file_layer(file: std::fs::File) -> BoxedLayer {
    let level = if cfg!(debug_assertions) { Level::DEBUG } else { Level::INFO };
    fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(file)
        .with_filter(EnvFilter::new(filter_directives(level)))
        .boxed()
}

/// Install the global subscriber; later calls are ignored
pub fn init_tracing(config: TracingConfig) {
    if TRACING_INITIALIZED.get().is_some() {
        return;
    }

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if let Some(log_path) = &config.log_file {
        match std::fs::File::create(log_path) {
            Ok(file) => layers.push(make_file_layer(file)),
            Err(e) => eprintln!("Warning: Failed to create log file {:?}: {}", log_path, e),
        }
    }

    if let Some(level) = config.terminal_level() {
        let filter = make_filter(level, config.cli_level_specified());
        layers.push(make_terminal_layer(&config.format, filter));
    }

    if layers.is_empty() {
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
    } else {
        let _ = tracing_subscriber::registry().with(layers).try_init();
    }

    let _ = TRACING_INITIALIZED.set(());
}
