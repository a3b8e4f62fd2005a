//! Structured logging for AODV routing simulations
//!
//! Every router logs through `tracing`; this crate decides where it ends up.
//!
//! # Features
//!
//! - **Console**: pretty text for people, JSON lines for pipes, or nothing
//! - **Trace file**: one truncated JSONL file per run, with its own level
//! - **Node Context Injection**: Spans record which node was being processed
//! - **`RUST_LOG` override**: The environment filter wins over the console level
//!
//! # Quick Start
//!
//! ```ignore
//! use aodv_logging::{AodvSubscriberBuilder, LogConfig};
//!
//! // Warnings on the console, the whole run at debug in runs/seed-1.jsonl
//! let _guard = AodvSubscriberBuilder::new()
//!     .with_config(LogConfig::interactive(false).with_trace_file("runs", "seed-1"))
//!     .init()?;
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleFormat, JsonlConfig, LogConfig, TraceFile};
pub use context::{NodeContextData, NodeContextGuard};
pub use layers::{NodeContextLayer, jsonl_layer};

use std::fs::{self, File};
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot open trace file {path}: {source}")]
    TraceFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builder for configuring and installing the logging subscriber
///
/// By default the console gets JSON lines at `info`.
pub struct AodvSubscriberBuilder {
    config: LogConfig,
}

impl AodvSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the console level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Set the console format
    pub fn with_console(mut self, console: ConsoleFormat) -> Self {
        self.config.console = console;
        self
    }

    /// Also write a JSONL trace of the run
    pub fn with_trace_file(mut self, trace: TraceFile) -> Self {
        self.config.trace_file = Some(trace);
        self
    }

    /// Install the subscriber globally
    ///
    /// With a trace file, the returned guard must be kept alive until the
    /// program ends so buffered lines get flushed.
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let (layers, guard) = self.layers()?;
        Registry::default()
            .with(layers)
            .with(NodeContextLayer::new())
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
        Ok(guard)
    }

    /// One filtered layer per enabled sink
    fn layers(&self) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>), LoggingError> {
        let config = &self.config;
        let console_filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
        };

        let mut layers: Vec<BoxedLayer> = Vec::new();
        match config.console {
            ConsoleFormat::Pretty => layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(config.ansi)
                    .with_target(true)
                    .with_filter(console_filter())
                    .boxed(),
            ),
            ConsoleFormat::Jsonl => layers.push(
                jsonl_layer(std::io::stdout, &config.jsonl)
                    .with_filter(console_filter())
                    .boxed(),
            ),
            ConsoleFormat::Off => {}
        }

        let guard = match &config.trace_file {
            Some(trace) => {
                let (writer, guard) = open_trace_file(trace)?;
                layers.push(
                    jsonl_layer(writer, &config.jsonl)
                        .with_filter(EnvFilter::new(&trace.level))
                        .boxed(),
                );
                Some(guard)
            }
            None => None,
        };
        Ok((layers, guard))
    }
}

impl Default for AodvSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate the trace file and wrap it in a non-blocking writer
fn open_trace_file(trace: &TraceFile) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let path = trace.path();
    let file = fs::create_dir_all(&trace.directory)
        .and_then(|()| File::create(&path))
        .map_err(|source| LoggingError::TraceFile { path, source })?;
    Ok(tracing_appender::non_blocking(file))
}

/// Initialize logging for testing (warnings only)
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_testing() {
    let _ = AodvSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}
