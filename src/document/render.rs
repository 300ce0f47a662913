//! HTML rendering of documents
//!
//! Code blocks with a language hint are highlighted with syntect; everything
//! else is escaped and emitted as plain semantic HTML.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::sync::Arc;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use super::{gallery_entry_alt, gallery_entry_src, Document, Mark, Node, NodeKind};

const DEFAULT_THEME: &str = "base16-ocean.dark";

static DEFAULT_RENDERER: Lazy<DocumentRenderer> = Lazy::new(DocumentRenderer::new);

/// Render a document with the shared default renderer
pub fn render_html(doc: &Document) -> String {
    DEFAULT_RENDERER.render(doc)
}

/// Document to HTML renderer.
///
/// Loading syntax definitions is expensive, so build one and share it.
#[derive(Clone)]
pub struct DocumentRenderer {
    syntax_set: Arc<SyntaxSet>,
    theme_set: Arc<ThemeSet>,
    theme_name: String,
}

impl Default for DocumentRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRenderer {
    pub fn new() -> Self {
        Self::with_theme(DEFAULT_THEME)
    }

    /// Use a named syntect theme, falling back to the default when unknown.
    pub fn with_theme(theme_name: &str) -> Self {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let theme_set = ThemeSet::load_defaults();

        let theme_name = if theme_set.themes.contains_key(theme_name) {
            theme_name.to_string()
        } else {
            DEFAULT_THEME.to_string()
        };

        Self {
            syntax_set: Arc::new(syntax_set),
            theme_set: Arc::new(theme_set),
            theme_name,
        }
    }

    pub fn render(&self, doc: &Document) -> String {
        let mut out = String::new();
        self.render_children(doc.root(), &mut out);
        out
    }

    fn render_children(&self, node: &Node, out: &mut String) {
        for child in &node.content {
            self.render_node(child, out);
        }
    }

    fn wrap(&self, tag: &str, node: &Node, out: &mut String) {
        out.push('<');
        out.push_str(tag);
        out.push('>');
        self.render_children(node, out);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }

    fn render_node(&self, node: &Node, out: &mut String) {
        match node.node_kind() {
            NodeKind::Doc => self.render_children(node, out),
            NodeKind::Paragraph => self.wrap("p", node, out),
            NodeKind::Heading => {
                let level = node.attr_u64("level").unwrap_or(2).clamp(1, 6);
                self.wrap(&format!("h{}", level), node, out);
            }
            NodeKind::Text => render_text(node, out),
            NodeKind::BulletList => self.wrap("ul", node, out),
            NodeKind::OrderedList => match node.attr_u64("start") {
                Some(start) if start > 1 => {
                    out.push_str(&format!("<ol start=\"{}\">", start));
                    self.render_children(node, out);
                    out.push_str("</ol>");
                }
                _ => self.wrap("ol", node, out),
            },
            NodeKind::ListItem => self.wrap("li", node, out),
            NodeKind::Blockquote => self.wrap("blockquote", node, out),
            NodeKind::CodeBlock => {
                let mut code = String::new();
                node.inline_text(&mut code);
                match node.attr_str("language").filter(|l| !l.trim().is_empty()) {
                    Some(lang) => out.push_str(&self.highlight_code(&code, lang)),
                    None => out.push_str(&plain_code_block(&code)),
                }
            }
            NodeKind::HardBreak => out.push_str("<br>"),
            NodeKind::HorizontalRule => out.push_str("<hr>"),
            NodeKind::Image => render_image(node, out),
            NodeKind::ImageGallery => render_gallery(node, out),
            NodeKind::Columns => {
                let count = node.content.len().max(1);
                let width = column_width(count);
                out.push_str(&format!("<div class=\"columns columns-{}\">", count));
                for column in &node.content {
                    out.push_str(&format!(
                        "<div class=\"column\" style=\"width:{}%\">",
                        width
                    ));
                    self.render_children(column, out);
                    out.push_str("</div>");
                }
                out.push_str("</div>");
            }
            NodeKind::Column => {
                out.push_str("<div class=\"column\">");
                self.render_children(node, out);
                out.push_str("</div>");
            }
            NodeKind::Unknown => self.render_children(node, out),
        }
    }

    fn highlight_code(&self, code: &str, lang: &str) -> String {
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang));

        match (syntax, self.theme_set.themes.get(&self.theme_name)) {
            (Some(syntax), Some(theme)) => {
                highlighted_html_for_string(code, &self.syntax_set, syntax, theme)
                    .unwrap_or_else(|_| plain_code_block(code))
            }
            _ => format!(
                "<pre><code class=\"language-{}\">{}</code></pre>",
                html_escape(lang),
                html_escape(code)
            ),
        }
    }
}

fn render_text(node: &Node, out: &mut String) {
    let text = html_escape(node.text.as_deref().unwrap_or_default());
    let mut closers = Vec::new();

    for mark in &node.marks {
        if let Some((open, close)) = mark_tags(mark) {
            out.push_str(&open);
            closers.push(close);
        }
    }
    out.push_str(&text);
    for close in closers.iter().rev() {
        out.push_str(close);
    }
}

fn mark_tags(mark: &Mark) -> Option<(String, &'static str)> {
    let simple = |tag: &'static str, close: &'static str| Some((format!("<{}>", tag), close));
    match mark.kind.as_str() {
        "bold" => simple("strong", "</strong>"),
        "italic" => simple("em", "</em>"),
        "strike" => simple("s", "</s>"),
        "underline" => simple("u", "</u>"),
        "code" => simple("code", "</code>"),
        "highlight" => simple("mark", "</mark>"),
        "superscript" => simple("sup", "</sup>"),
        "subscript" => simple("sub", "</sub>"),
        "link" => {
            let href = mark
                .attrs
                .get("href")
                .and_then(Value::as_str)
                .filter(|href| is_safe_url(href))?;
            Some((
                format!(
                    "<a href=\"{}\" rel=\"noopener noreferrer\">",
                    html_escape(href)
                ),
                "</a>",
            ))
        }
        _ => None,
    }
}

fn render_image(node: &Node, out: &mut String) {
    let Some(src) = node.image_src().filter(|src| is_safe_url(src)) else {
        return;
    };

    out.push_str(&format!(
        "<img src=\"{}\" alt=\"{}\"",
        html_escape(src),
        html_escape(node.attr_str("alt").unwrap_or_default())
    ));
    if let Some(title) = node.attr_str("title") {
        out.push_str(&format!(" title=\"{}\"", html_escape(title)));
    }
    if let Some(width) = node.attrs.get("width").and_then(css_width) {
        out.push_str(&format!(" style=\"width:{}\"", html_escape(&width)));
    }
    out.push_str(" loading=\"lazy\">");
}

fn render_gallery(node: &Node, out: &mut String) {
    let entries: Vec<Value> = node
        .gallery_entries()
        .into_iter()
        .filter(|entry| gallery_entry_src(entry).is_some_and(is_safe_url))
        .collect();

    out.push_str(&format!(
        "<div class=\"image-gallery layout-{}\" data-count=\"{}\">",
        node.gallery_layout(),
        entries.len()
    ));
    for entry in &entries {
        out.push_str(&format!(
            "<img src=\"{}\" alt=\"{}\" loading=\"lazy\">",
            html_escape(gallery_entry_src(entry).unwrap_or_default()),
            html_escape(gallery_entry_alt(entry))
        ));
    }
    out.push_str("</div>");
}

/// Image width as CSS: a plain number in pixels, or digits followed by `px` or `%`
fn css_width(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => n.as_u64().map(|px| format!("{}px", px)),
        Value::String(s) => {
            let s = s.trim();
            let digits = s
                .strip_suffix("px")
                .or_else(|| s.strip_suffix('%'))
                .unwrap_or(s);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            if digits.len() == s.len() {
                Some(format!("{}px", digits))
            } else {
                Some(s.to_string())
            }
        }
        _ => None,
    }
}

fn plain_code_block(code: &str) -> String {
    format!("<pre><code>{}</code></pre>", html_escape(code))
}

/// Equal column width in percent, without trailing zeros
fn column_width(count: usize) -> String {
    let formatted = format!("{:.4}", 100.0 / count as f64);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Relative URLs and http(s)/mailto links only
fn is_safe_url(url: &str) -> bool {
    let url = url.trim();
    match url.find(':') {
        None => true,
        Some(idx) => {
            let scheme = &url[..idx];
            if scheme.contains(['/', '?', '#']) {
                return true;
            }
            matches!(
                scheme.to_ascii_lowercase().as_str(),
                "http" | "https" | "mailto"
            )
        }
    }
}

/// Escapes HTML special characters in a string.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
