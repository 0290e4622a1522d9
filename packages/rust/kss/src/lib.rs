//! KSS documentation parser.
//!
//! Turns CSS/Sass/Less source into a [`StyleguideModel`] by reading KSS
//! comment blocks. Parsing is a pure function of the source text and the
//! [`ParseOptions`].

mod comments;
mod parser;

use tracing::{debug, instrument, warn};

use kss_styleguide_shared::{ParseOptions, Result, StyleguideModel};

pub use parser::{modifier_class, substitute_class};

/// Stateless KSS parser; the default documentation model builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct KssParser;

impl KssParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse `source` into a style guide model.
    pub fn parse(&self, source: &str, options: &ParseOptions) -> Result<StyleguideModel> {
        parse(source, options)
    }
}

/// Parse every KSS comment block in `source`.
///
/// Blocks without a `Styleguide` reference are skipped. When two blocks share
/// a reference the later one wins.
#[instrument(skip_all, fields(len = source.len(), markdown = options.markdown))]
pub fn parse(source: &str, options: &ParseOptions) -> Result<StyleguideModel> {
    let blocks = comments::extract(source)?;
    let mut model = StyleguideModel::new();

    for block in &blocks {
        let Some(section) = parser::parse_block(&block.text, options) else {
            continue;
        };
        let reference = section.reference.clone();
        if model.insert(section).is_some() {
            warn!(%reference, line = block.line, "duplicate section reference, keeping the later one");
        }
    }

    debug!(
        comment_blocks = blocks.len(),
        sections = model.len(),
        "kss source parsed"
    );

    Ok(model)
}
