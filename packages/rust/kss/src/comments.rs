//! Comment block extraction.
//!
//! Pulls `/* ... */` blocks and runs of consecutive `//` lines out of CSS,
//! Sass, or Less source. Decorative leading `*` columns are stripped and the
//! block is de-indented.

use kss_styleguide_shared::{Result, StyleguideError};

/// A raw comment block with the line it started on (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommentBlock {
    pub line: usize,
    pub text: String,
}

/// Extract every comment block from `source`, in order of appearance.
///
/// Fails only on a `/*` that is never closed.
pub(crate) fn extract(source: &str) -> Result<Vec<CommentBlock>> {
    let mut blocks = Vec::new();
    let mut block_lines: Vec<String> = Vec::new();
    let mut block_start = 0;
    let mut in_block = false;
    let mut in_line_run = false;

    for (index, line) in source.lines().enumerate() {
        let line_no = index + 1;
        let mut rest = line;

        if in_block {
            let Some(end) = rest.find("*/") else {
                block_lines.push(rest.to_string());
                continue;
            };
            block_lines.push(rest[..end].to_string());
            blocks.push(finish(block_start, &mut block_lines, true));
            in_block = false;
            rest = &rest[end + 2..];
        } else {
            if let Some(text) = line.trim_start().strip_prefix("//") {
                if !in_line_run {
                    in_line_run = true;
                    block_start = line_no;
                }
                block_lines.push(text.strip_prefix(' ').unwrap_or(text).to_string());
                continue;
            }
            if in_line_run {
                blocks.push(finish(block_start, &mut block_lines, false));
                in_line_run = false;
            }
        }

        while let Some(start) = find_block_open(rest) {
            let body = &rest[start + 2..];
            // `/**` opens a doc block, but in `/**/` the star belongs to the close.
            let body = match body.strip_prefix('*') {
                Some(tail) if !tail.starts_with('/') => tail,
                _ => body,
            };
            let body = body.strip_prefix(' ').unwrap_or(body);
            block_start = line_no;
            match body.find("*/") {
                Some(end) => {
                    block_lines.push(body[..end].to_string());
                    blocks.push(finish(block_start, &mut block_lines, true));
                    rest = &body[end + 2..];
                }
                None => {
                    block_lines.push(body.to_string());
                    in_block = true;
                    break;
                }
            }
        }
    }

    if in_block {
        return Err(StyleguideError::parse(format!(
            "unterminated comment starting at line {block_start}"
        )));
    }
    if in_line_run {
        blocks.push(finish(block_start, &mut block_lines, false));
    }

    Ok(blocks)
}

/// Byte offset of the first `/*` in a line of code.
///
/// Openers inside quoted strings are skipped, and a `//` comment ends the
/// search. A `//` glued to other text (`url(http://...)`) is not a comment.
fn find_block_open(code: &str) -> Option<usize> {
    let bytes = code.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(_) if b == b'\\' => i += 1,
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match (b, bytes.get(i + 1)) {
                (b'"' | b'\'', _) => quote = Some(b),
                (b'/', Some(b'*')) => return Some(i),
                (b'/', Some(b'/')) if i == 0 || bytes[i - 1].is_ascii_whitespace() => {
                    return None;
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Turn the accumulated lines into a block and reset the buffer.
fn finish(line: usize, lines: &mut Vec<String>, strip_stars: bool) -> CommentBlock {
    let cleaned: Vec<String> = lines
        .drain(..)
        .map(|l| {
            if strip_stars {
                strip_star_column(&l)
            } else {
                l
            }
        })
        .map(|l| l.trim_end().to_string())
        .collect();

    CommentBlock {
        line,
        text: dedent(&cleaned).trim_matches('\n').to_string(),
    }
}

/// ` * text` → `text`, ` *` → ``.
fn strip_star_column(line: &str) -> String {
    let trimmed = line.trim_start();
    match trimmed.strip_prefix('*') {
        Some(rest) if !rest.starts_with('*') => rest.strip_prefix(' ').unwrap_or(rest).to_string(),
        _ => line.to_string(),
    }
}

/// Remove the indentation shared by every non-blank line.
fn dedent(lines: &[String]) -> String {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    lines
        .iter()
        .map(|l| match l.get(..indent) {
            Some(prefix) if prefix.trim().is_empty() => &l[indent..],
            _ => l.trim_start(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
