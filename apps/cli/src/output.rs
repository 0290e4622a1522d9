//! Section output written by the `build` command.
//!
//! Per root section: `section-<ref>.json` (the root and its descendants) and
//! `section-<ref>.html` (rendered markup previews). After every section has
//! drained: `index.json`.

use std::path::{Path, PathBuf};

use serde_json::json;

use kss_styleguide_core::{Artifact, BuildContext, Producer, single};
use kss_styleguide_markdown::{escape_html, render_inline};
use kss_styleguide_shared::{ProducerError, Section, SectionRef, StyleguideModel};

/// Writes one run's output files into `out_dir`.
#[derive(Debug, Clone)]
pub(crate) struct SectionWriter {
    out_dir: PathBuf,
    /// Whether model descriptions are already rendered HTML.
    markdown: bool,
}

impl SectionWriter {
    pub(crate) fn new(out_dir: impl Into<PathBuf>, markdown: bool) -> Self {
        Self {
            out_dir: out_dir.into(),
            markdown,
        }
    }

    /// Producers for one root section: its JSON and its HTML preview.
    pub(crate) fn section_producers(&self, ctx: &BuildContext) -> Vec<Producer> {
        let Some(root) = ctx.current_section.as_ref() else {
            return Vec::new();
        };

        let json_path = self.out_dir.join(format!("section-{root}.json"));
        let html_path = self.out_dir.join(format!("section-{root}.html"));

        vec![
            match serde_json::to_string_pretty(&section_json(&ctx.model, root)) {
                Ok(body) => write_file(json_path, body),
                Err(e) => failed(e.into()),
            },
            write_file(html_path, self.section_html(&ctx.model, root)),
        ]
    }

    /// Producer for `index.json`, written once every section has been built.
    pub(crate) fn index_producer(&self, ctx: &BuildContext) -> Producer {
        match serde_json::to_string_pretty(&index_json(&ctx.model)) {
            Ok(body) => write_file(self.out_dir.join("index.json"), body),
            Err(e) => failed(e.into()),
        }
    }

    fn section_html(&self, model: &StyleguideModel, root: &SectionRef) -> String {
        model
            .get(root)
            .into_iter()
            .chain(model.descendants(root))
            .map(|section| self.section_fragment(section))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Inline text as HTML: rendered when markdown is on, escaped otherwise.
    fn inline(&self, text: &str) -> String {
        if self.markdown {
            render_inline(text)
        } else {
            escape_html(text)
        }
    }

    fn section_fragment(&self, section: &Section) -> String {
        let mut html = format!(
            "<section id=\"section-{reference}\" class=\"kss-section\">\n<h{level}>{reference} {header}</h{level}>\n",
            reference = escape_html(section.reference.as_str()),
            level = (section.reference.depth() + 1).min(6),
            header = self.inline(&section.header),
        );

        if section.is_deprecated {
            html.push_str("<p class=\"kss-flag\">Deprecated</p>\n");
        }
        if section.is_experimental {
            html.push_str("<p class=\"kss-flag\">Experimental</p>\n");
        }
        if !section.description.is_empty() {
            html.push_str("<div class=\"kss-description\">");
            if self.markdown {
                html.push_str(&section.description);
            } else {
                html.push_str(&escape_html(&section.description));
            }
            html.push_str("</div>\n");
        }
        if !section.markup.is_empty() {
            let plain = kss_styleguide_kss::substitute_class(&section.markup, "");
            html.push_str(&format!("<div class=\"kss-markup\">{plain}</div>\n"));
            for modifier in &section.modifiers {
                html.push_str(&format!(
                    "<div class=\"kss-modifier\" data-modifier=\"{name}\">{markup}</div>\n",
                    name = escape_html(&modifier.name),
                    markup = modifier.markup,
                ));
            }
        }

        html.push_str("</section>");
        html
    }
}

fn write_file(path: PathBuf, body: String) -> Producer {
    single(async move {
        tokio::fs::write(&path, body.as_bytes())
            .await
            .map_err(|e| -> ProducerError { format!("{}: {e}", path.display()).into() })?;
        Ok(Artifact::new(path.display().to_string(), body.len()))
    })
}

fn failed(error: ProducerError) -> Producer {
    single(async move { Err(error) })
}

// ---------------------------------------------------------------------------
// Renderers
// ---------------------------------------------------------------------------

fn section_json(model: &StyleguideModel, root: &SectionRef) -> serde_json::Value {
    let children: Vec<&Section> = model.descendants(root).collect();
    json!({
        "section": model.get(root),
        "children": children,
    })
}

fn index_json(model: &StyleguideModel) -> serde_json::Value {
    let roots: Vec<serde_json::Value> = model
        .root_references()
        .iter()
        .filter_map(|reference| model.get(reference))
        .map(|section| {
            json!({
                "reference": section.reference,
                "header": section.header,
                "json": format!("section-{}.json", section.reference),
                "html": format!("section-{}.html", section.reference),
            })
        })
        .collect();

    json!({
        "sections": model.len(),
        "roots": roots,
    })
}
