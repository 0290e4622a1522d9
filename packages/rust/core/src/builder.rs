//! Documentation model builder seam.

use std::future::Future;

use kss_styleguide_kss::KssParser;
use kss_styleguide_shared::{ParseOptions, Result, StyleguideError, StyleguideModel};

/// Turns the buffered source into a [`StyleguideModel`].
///
/// Called exactly once per run, after end-of-input.
pub trait ModelBuilder: Send + Sync {
    fn build(
        &self,
        source: String,
        options: ParseOptions,
    ) -> impl Future<Output = Result<StyleguideModel>> + Send;
}

impl ModelBuilder for KssParser {
    /// Parses on the blocking pool so large inputs don't stall the runtime.
    fn build(
        &self,
        source: String,
        options: ParseOptions,
    ) -> impl Future<Output = Result<StyleguideModel>> + Send {
        let parser = *self;
        async move {
            tokio::task::spawn_blocking(move || parser.parse(&source, &options))
                .await
                .map_err(|e| StyleguideError::parse(format!("parser task failed: {e}")))?
        }
    }
}
