//! Error types for kss-styleguide.
//!
//! Library crates use [`StyleguideError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

use crate::types::{Phase, SectionRef};

/// Identifier carried by every error surfaced to the host pipeline.
pub const PLUGIN_NAME: &str = "kss-styleguide";

/// Boxed error returned by caller-supplied output producers.
pub type ProducerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all kss-styleguide operations.
#[derive(Debug, thiserror::Error)]
pub enum StyleguideError {
    /// A pipeline chunk carried a nested stream instead of concrete content.
    #[error("[kss-styleguide] cannot operate on streamed contents: {path:?}")]
    InputShape { path: PathBuf },

    /// The documentation model builder rejected the buffered source.
    #[error("[kss-styleguide] parse failed: {message}")]
    Parse { message: String },

    /// A producer returned by the per-section build callback failed.
    #[error("[kss-styleguide] section build failed for {section}: {message}")]
    SectionBuild { section: SectionRef, message: String },

    /// A producer returned by the finalize callback failed.
    #[error("[kss-styleguide] finalize failed: {message}")]
    Finalize { message: String },

    /// A phase's producers did not drain within the configured bound.
    #[error("[kss-styleguide] {phase} did not drain within {after:?}")]
    Timeout { phase: Phase, after: Duration },

    /// Configuration loading or validation error.
    #[error("[kss-styleguide] config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("[kss-styleguide] I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StyleguideError>;

impl StyleguideError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a failed section producer.
    pub fn section_build(section: SectionRef, source: &ProducerError) -> Self {
        Self::SectionBuild {
            section,
            message: source.to_string(),
        }
    }

    /// Wrap a failed finalize producer.
    pub fn finalize(source: &ProducerError) -> Self {
        Self::Finalize {
            message: source.to_string(),
        }
    }

    /// The fixed plugin identifier.
    pub fn plugin(&self) -> &'static str {
        PLUGIN_NAME
    }

    /// The orchestration phase this error aborted, if it belongs to one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::InputShape { .. } => Some(Phase::Buffering),
            Self::Parse { .. } => Some(Phase::Parsing),
            Self::SectionBuild { .. } => Some(Phase::SectionBuilding),
            Self::Finalize { .. } => Some(Phase::Finalizing),
            Self::Timeout { phase, .. } => Some(*phase),
            Self::Config { .. } | Self::Io { .. } => None,
        }
    }
}
