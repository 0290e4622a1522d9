//! Markdown-to-HTML rendering for style guide descriptions.
//!
//! CommonMark via `pulldown-cmark`, with strikethrough and tables enabled.
//! Raw HTML in a description is escaped rather than passed through.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd, html};
use tracing::{instrument, trace};

/// Extensions enabled for every description.
fn options() -> Options {
    Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES
}

/// Raw HTML becomes text so the writer escapes it.
fn escape_raw_html(event: Event<'_>) -> Event<'_> {
    match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    }
}

/// Render a Markdown description to an HTML fragment.
#[instrument(skip_all, fields(len = md.len()))]
pub fn render(md: &str) -> String {
    let events = Parser::new_ext(md, options()).map(escape_raw_html);

    let mut out = String::with_capacity(md.len() * 3 / 2);
    html::push_html(&mut out, events);

    trace!(bytes = out.len(), "markdown rendered");
    out.trim_end().to_string()
}

/// Render a single line of Markdown without the surrounding `<p>`.
pub fn render_inline(text: &str) -> String {
    let events = Parser::new_ext(text, options())
        .filter(|event| {
            !matches!(
                event,
                Event::Start(Tag::Paragraph) | Event::End(TagEnd::Paragraph)
            )
        })
        .map(escape_raw_html);

    let mut out = String::with_capacity(text.len());
    html::push_html(&mut out, events);
    out.trim_end().to_string()
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
