//! Shared types, error model, and configuration for kss-styleguide.
//!
//! This crate is the foundation depended on by all other kss-styleguide crates.
//! It provides:
//! - [`StyleguideError`]: the unified error type
//! - Domain types ([`StyleguideModel`], [`Section`], [`Modifier`], [`SectionRef`], [`Phase`])
//! - Configuration ([`AppConfig`], [`StyleguideOptions`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildConfig, ParseConfig, ParseOptions, StyleguideOptions, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{PLUGIN_NAME, ProducerError, Result, StyleguideError};
pub use types::{Modifier, Phase, RunId, Section, SectionRef, StyleguideModel, source_digest};
