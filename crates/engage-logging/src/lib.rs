//! Structured logging for the engagement synchronizer
//!
//! # Features
//!
//! - **Console Output**: pretty human-readable or JSONL
//! - **File Output**: JSONL with daily/hourly rotation via tracing-appender
//! - **User Context**: user id and session id on every span opened in scope
//! - **RUST_LOG**: overrides the configured default level
//!
//! # Quick Start
//!
//! ```ignore
//! use engage_logging::{EngageSubscriberBuilder, LogConfig};
//!
//! // JSONL to console
//! EngageSubscriberBuilder::new().init()?;
//!
//! // Pretty output while developing
//! EngageSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```
//!
//! # User Context
//!
//! ```ignore
//! use engage_logging::UserContextGuard;
//!
//! let _guard = UserContextGuard::new(&local_user);
//! let engine = EngagementEngine::spawn(config, local_user, collaborators);
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{UserContext, UserContextGuard};
pub use layers::UserContextLayer;
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("cannot create log file in {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create rolling appender: {0}")]
    Appender(#[from] InitError),

    #[error("global subscriber already set: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builder for the global logging subscriber
pub struct EngageSubscriberBuilder {
    config: LogConfig,
}

impl EngageSubscriberBuilder {
    /// Default configuration: JSONL to console at `info`
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default level directive
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes file output on drop and must be kept alive.
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.default_level));

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if self.config.console.enabled {
            layers.push(if self.config.console.pretty {
                tracing_subscriber::fmt::layer()
                    .with_ansi(self.config.console.ansi)
                    .with_target(true)
                    .boxed()
            } else {
                self.jsonl_layer(std::io::stdout)
            });
        }

        if let Some(file) = &self.config.file {
            let (writer, file_guard) = file_writer(file)?;
            layers.push(self.jsonl_layer(writer));
            guard = Some(file_guard);
        }

        Registry::default()
            .with(layers)
            .with(UserContextLayer::new())
            .with(filter)
            .try_init()?;

        Ok(guard)
    }

    fn jsonl_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
    {
        let jsonl = &self.config.jsonl;
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(jsonl.include_spans)
            .flatten_event(jsonl.flatten_events)
            .with_file(jsonl.include_location)
            .with_line_number(jsonl.include_location)
            .with_thread_ids(jsonl.include_thread_info)
            .with_thread_names(jsonl.include_thread_info)
            .with_writer(writer)
            .boxed()
    }
}

impl Default for EngageSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking writer for the configured file output
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match config.rotation {
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Never => {
            let io_error = |source| LoggingError::Io {
                path: config.directory.clone(),
                source,
            };
            fs::create_dir_all(&config.directory).map_err(io_error)?;
            let file = File::create(config.directory.join(format!("{}.log", config.prefix)))
                .map_err(io_error)?;
            return Ok(tracing_appender::non_blocking(file));
        }
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder.build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// JSONL to console at `info`
pub fn init_default() -> Result<(), LoggingError> {
    EngageSubscriberBuilder::new().init().map(|_| ())
}

/// Pretty console output at `debug`
pub fn init_development() -> Result<(), LoggingError> {
    EngageSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
        .map(|_| ())
}

/// Minimal output for tests; a subscriber installed earlier is kept
pub fn init_testing() {
    let _ = EngageSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_jsonl() {
        let builder = EngageSubscriberBuilder::new();
        assert_eq!(builder.config.default_level, "info");
        assert!(!builder.config.console.pretty);
    }

    #[test]
    fn test_builder_overrides() {
        let builder = EngageSubscriberBuilder::new()
            .with_config(LogConfig::development())
            .with_level("trace")
            .with_console(false);
        assert_eq!(builder.config.default_level, "trace");
        assert!(!builder.config.console.enabled);
    }

    #[test]
    fn test_init_testing_is_repeatable() {
        init_testing();
        init_testing();
        tracing::warn!("still logging");
    }
}
