//! KSS section parser.
//!
//! A comment block documents a section when its last paragraph is a
//! reference line:
//! - First paragraph: header on line 1, further lines open the description
//! - `Markup:` paragraph: example markup
//! - `name - description` paragraph: modifiers, in declaration order
//! - `Deprecated:` / `Experimental:` paragraphs: flags (kept in the description)
//! - Last paragraph: `Styleguide 2.1.3` (case-insensitive, optional `:`)

use std::sync::LazyLock;

use regex::Regex;

use kss_styleguide_shared::{Modifier, ParseOptions, Section, SectionRef};

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches `Styleguide 2.1.3`, `styleguide: 1.0`, `Styleguide forms.inputs.`.
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^styleguide(?:\s*:\s*|\s+)([\w-]+(?:\.[\w-]+)*)\.?$")
        .expect("reference regex")
});

/// Matches `.primary - Description` or `:hover - Description`.
static MODIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([.:][\w.:-]+|[\w-]+)\s+-\s+(.+)$").expect("modifier regex")
});

/// Matches a `Markup:` paragraph opener.
static MARKUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^markup:\s*(.*)$").expect("markup regex"));

/// Placeholders substituted with a modifier's class name.
const MODIFIER_PLACEHOLDERS: [&str; 2] = ["{{modifier_class}}", "{$modifiers}"];

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse one comment block. Returns `None` when it carries no reference.
pub(crate) fn parse_block(block: &str, options: &ParseOptions) -> Option<Section> {
    let mut paragraphs = split_paragraphs(block);
    let reference = paragraphs
        .last()
        .and_then(|last| REFERENCE_RE.captures(last.trim()))
        .map(|caps| SectionRef::new(&caps[1]))?;
    paragraphs.pop();

    let mut header = String::new();
    let mut description: Vec<String> = Vec::new();
    let mut markup = String::new();
    let mut modifiers: Vec<(String, String)> = Vec::new();
    let mut is_deprecated = false;
    let mut is_experimental = false;

    let mut rest = paragraphs.into_iter();
    if let Some(first) = rest.next() {
        let mut lines = first.lines();
        header = lines.next().unwrap_or_default().trim().to_string();
        let tail: Vec<&str> = lines.collect();
        if !tail.is_empty() {
            description.push(tail.join("\n"));
        }
    }

    for paragraph in rest {
        if let Some(caps) = MARKUP_RE.captures(&paragraph) {
            markup = caps[1].trim().to_string();
            continue;
        }

        if let Some(parsed) = parse_modifiers(&paragraph) {
            modifiers.extend(parsed);
            continue;
        }

        let lowered = paragraph.to_ascii_lowercase();
        if lowered.starts_with("deprecated:") {
            is_deprecated = true;
        } else if lowered.starts_with("experimental:") {
            is_experimental = true;
        }
        description.push(paragraph);
    }

    let description = description.join("\n\n");
    let description = if options.markdown {
        kss_styleguide_markdown::render(&description)
    } else {
        description
    };

    let modifiers = modifiers
        .into_iter()
        .map(|(name, text)| Modifier {
            markup: substitute_class(&markup, &modifier_class(&name)),
            description: if options.markdown {
                kss_styleguide_markdown::render_inline(&text)
            } else {
                text
            },
            name,
        })
        .collect();

    Some(Section {
        reference,
        header,
        description,
        is_deprecated,
        is_experimental,
        markup,
        modifiers,
    })
}

/// Class attribute value for a modifier name.
///
/// `.primary.large` → `primary large`, `:hover` → `pseudo-class-hover`.
pub fn modifier_class(name: &str) -> String {
    name.replace('.', " ")
        .replace(':', " pseudo-class-")
        .trim()
        .to_string()
}

/// Replace the modifier placeholders in `markup` with `class`.
pub fn substitute_class(markup: &str, class: &str) -> String {
    MODIFIER_PLACEHOLDERS
        .iter()
        .fold(markup.to_string(), |acc, placeholder| acc.replace(placeholder, class))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn split_paragraphs(block: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

/// Parse a modifier paragraph. The first line must be `name - description`;
/// later lines that are not modifiers continue the previous description.
fn parse_modifiers(paragraph: &str) -> Option<Vec<(String, String)>> {
    let mut lines = paragraph.lines();
    let first = MODIFIER_RE.captures(lines.next()?.trim())?;
    let mut modifiers = vec![(first[1].to_string(), first[2].trim().to_string())];

    for line in lines {
        let trimmed = line.trim();
        if let Some(caps) = MODIFIER_RE.captures(trimmed) {
            modifiers.push((caps[1].to_string(), caps[2].trim().to_string()));
        } else if let Some((_, text)) = modifiers.last_mut() {
            text.push(' ');
            text.push_str(trimmed);
        }
    }

    Some(modifiers)
}
