//! Parsers turn a [`RawDocument`] into a [`StructuredDocument`] element tree. Direct
//! descendants of a flat-text extractor, generalized so tables, headings, lists and code
//! survive instead of collapsing into one blob.

use async_trait::async_trait;
use kb_core::model::{Element, RawDocument, StructuredDocument, TableCell};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ParserError {
    /// The mime is one this crate has no structural backend for yet (binary office
    /// formats, PDF, image/OCR, email). Not a silent stub: callers see exactly why.
    #[error("no parser backend for mime {0}")]
    UnsupportedMime(String),
    #[error("could not decode bytes as text: {0}")]
    Encoding(String),
    #[error("malformed input: {0}")]
    Malformed(String),
}

pub type ParserResult<T> = std::result::Result<T, ParserError>;

/// Mime families this crate has no structural backend for. Listed explicitly so the
/// registry fails loudly with `UnsupportedMime` instead of silently falling back to a
/// flat-text parse that would lose the document's actual structure.
fn is_opaque_mime(mime: &str) -> bool {
    matches!(
        mime,
        "application/pdf"
            | "application/msword"
            | "application/vnd.ms-excel"
            | "application/vnd.ms-powerpoint"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            | "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            | "message/rfc822"
            | "application/vnd.ms-outlook"
    ) || mime.starts_with("image/")
}

#[async_trait]
pub trait Parser: Send + Sync {
    /// Exact mime strings this parser owns. The registry still asks [`Parser::can_handle`]
    /// before dispatching, so a parser can accept a family via prefix match too.
    fn supported_mimes(&self) -> &[&'static str];

    fn can_handle(&self, mime: &str) -> bool {
        self.supported_mimes().contains(&mime)
    }

    async fn parse(&self, document: &RawDocument) -> ParserResult<StructuredDocument>;

    fn name(&self) -> &'static str;
}

fn decode_text(bytes: &[u8]) -> ParserResult<String> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => {
            let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
            if had_errors {
                Err(ParserError::Encoding("bytes are neither valid UTF-8 nor windows-1252".into()))
            } else {
                Ok(decoded.into_owned())
            }
        }
    }
}

/// Splits text into paragraphs on blank-line boundaries. The minimum every parser (and the
/// generic fallback) must do to satisfy "never emit one undifferentiated blob".
fn paragraphs_from_text(text: &str) -> Vec<Element> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| Element::Paragraph {
            text: p.to_string(),
            style_runs: Vec::new(),
        })
        .collect()
}

/// Fallback for any mime this crate does not special-case. Still tokenizes into paragraphs
/// rather than producing a flat blob; reserved for mimes that are text-shaped but unstructured.
pub struct GenericTextParser {
    pub max_size: usize,
}

impl GenericTextParser {
    pub fn new() -> Self {
        Self { max_size: 50 * 1024 * 1024 }
    }
}

impl Default for GenericTextParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Parser for GenericTextParser {
    fn supported_mimes(&self) -> &[&'static str] {
        &["text/plain", "text/csv", "text/tab-separated-values"]
    }

    fn can_handle(&self, mime: &str) -> bool {
        mime.starts_with("text/") || self.supported_mimes().contains(&mime)
    }

    async fn parse(&self, document: &RawDocument) -> ParserResult<StructuredDocument> {
        if document.bytes.len() > self.max_size {
            return Err(ParserError::Malformed(format!(
                "document exceeds max parser size of {} bytes",
                self.max_size
            )));
        }
        let text = decode_text(&document.bytes)?;
        let mut doc = StructuredDocument::new(document.source_id);
        doc.elements = paragraphs_from_text(&text);
        Ok(doc)
    }

    fn name(&self) -> &'static str {
        "generic-text"
    }
}

/// Hand-rolled, dependency-free Markdown structural parser: headings, fenced code blocks,
/// pipe tables, and list items are recognized; everything else becomes paragraphs.
pub struct MarkdownParser;

impl MarkdownParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_table(lines: &[&str]) -> Option<Element> {
        if lines.len() < 2 {
            return None;
        }
        let is_separator = |l: &str| {
            l.trim().trim_matches('|').split('|').all(|c| {
                let c = c.trim();
                !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':')
            })
        };
        if !is_separator(lines[1]) {
            return None;
        }
        let mut rows = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if i == 1 {
                continue;
            }
            let cells: Vec<TableCell> = line
                .trim()
                .trim_matches('|')
                .split('|')
                .map(|c| TableCell {
                    text: c.trim().to_string(),
                    col_span: 1,
                    row_span: 1,
                })
                .collect();
            rows.push(cells);
        }
        Some(Element::Table { rows })
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Parser for MarkdownParser {
    fn supported_mimes(&self) -> &[&'static str] {
        &["text/markdown", "text/x-markdown"]
    }

    async fn parse(&self, document: &RawDocument) -> ParserResult<StructuredDocument> {
        let text = decode_text(&document.bytes)?;
        let mut doc = StructuredDocument::new(document.source_id);
        let lines: Vec<&str> = text.lines().collect();

        let mut i = 0;
        let mut paragraph_buf: Vec<&str> = Vec::new();
        let flush_paragraph = |buf: &mut Vec<&str>, elements: &mut Vec<Element>| {
            if !buf.is_empty() {
                let text = buf.join(" ").trim().to_string();
                if !text.is_empty() {
                    elements.push(Element::Paragraph { text, style_runs: Vec::new() });
                }
                buf.clear();
            }
        };

        while i < lines.len() {
            let line = lines[i];
            let trimmed = line.trim_start();

            if let Some(stripped) = trimmed.strip_prefix('#') {
                flush_paragraph(&mut paragraph_buf, &mut doc.elements);
                let level = (line.len() - stripped.len()).min(6) as u8;
                let heading_text = stripped.trim_start_matches('#').trim().to_string();
                if doc.title.is_none() && level == 1 {
                    doc.title = Some(heading_text.clone());
                }
                doc.elements.push(Element::Heading { level: level.max(1), text: heading_text });
                i += 1;
                continue;
            }

            if let Some(lang) = trimmed.strip_prefix("```") {
                flush_paragraph(&mut paragraph_buf, &mut doc.elements);
                let language = if lang.trim().is_empty() { None } else { Some(lang.trim().to_string()) };
                let mut code_lines = Vec::new();
                i += 1;
                while i < lines.len() && !lines[i].trim_start().starts_with("```") {
                    code_lines.push(lines[i]);
                    i += 1;
                }
                i += 1; // consume closing fence
                doc.elements.push(Element::CodeBlock { language, text: code_lines.join("\n") });
                continue;
            }

            if trimmed.contains('|') && i + 1 < lines.len() {
                let mut table_lines = vec![line];
                let mut j = i + 1;
                while j < lines.len() && lines[j].contains('|') {
                    table_lines.push(lines[j]);
                    j += 1;
                }
                if let Some(table) = Self::parse_table(&table_lines) {
                    flush_paragraph(&mut paragraph_buf, &mut doc.elements);
                    doc.elements.push(table);
                    i = j;
                    continue;
                }
            }

            if trimmed.starts_with("- ") || trimmed.starts_with("* ") || trimmed.starts_with("+ ") {
                flush_paragraph(&mut paragraph_buf, &mut doc.elements);
                let depth = ((line.len() - trimmed.len()) / 2) as u32;
                doc.elements.push(Element::ListItem { depth, text: trimmed[2..].trim().to_string() });
                i += 1;
                continue;
            }

            if trimmed.is_empty() {
                flush_paragraph(&mut paragraph_buf, &mut doc.elements);
                i += 1;
                continue;
            }

            paragraph_buf.push(trimmed);
            i += 1;
        }
        flush_paragraph(&mut paragraph_buf, &mut doc.elements);

        Ok(doc)
    }

    fn name(&self) -> &'static str {
        "markdown"
    }
}

/// Walks an HTML DOM into the element tree. `<script>`/`<style>`/`<nav>` are dropped unless
/// nested inside `<article>`/`<main>`.
pub struct HtmlParser;

impl HtmlParser {
    pub fn new() -> Self {
        Self
    }

    fn walk(node: scraper::ElementRef, inside_content: bool, out: &mut Vec<Element>) {
        let tag = node.value().name();
        let is_content_container = matches!(tag, "article" | "main");
        let skip_unless_content = matches!(tag, "script" | "style" | "nav");

        if skip_unless_content && !inside_content {
            return;
        }

        let next_inside_content = inside_content || is_content_container;

        match tag {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse().unwrap_or(1);
                let text = node.text().collect::<Vec<_>>().join(" ").trim().to_string();
                if !text.is_empty() {
                    out.push(Element::Heading { level, text });
                }
            }
            "pre" | "code" => {
                let text = node.text().collect::<Vec<_>>().join("");
                if !text.trim().is_empty() {
                    let language = node.value().attr("class").and_then(|c| {
                        c.split_whitespace().find_map(|cls| cls.strip_prefix("language-"))
                    });
                    out.push(Element::CodeBlock { language: language.map(str::to_string), text });
                }
            }
            "li" => {
                let text = node.text().collect::<Vec<_>>().join(" ").trim().to_string();
                if !text.is_empty() {
                    out.push(Element::ListItem { depth: 0, text });
                }
            }
            "table" => {
                let mut rows = Vec::new();
                for tr in node.select(&scraper::Selector::parse("tr").unwrap()) {
                    let mut row = Vec::new();
                    for cell in tr.select(&scraper::Selector::parse("td,th").unwrap()) {
                        row.push(TableCell {
                            text: cell.text().collect::<Vec<_>>().join(" ").trim().to_string(),
                            col_span: cell.value().attr("colspan").and_then(|v| v.parse().ok()).unwrap_or(1),
                            row_span: cell.value().attr("rowspan").and_then(|v| v.parse().ok()).unwrap_or(1),
                        });
                    }
                    if !row.is_empty() {
                        rows.push(row);
                    }
                }
                if !rows.is_empty() {
                    out.push(Element::Table { rows });
                }
            }
            "img" => {
                let uri = node.value().attr("src").unwrap_or_default().to_string();
                let caption = node.value().attr("alt").map(str::to_string);
                out.push(Element::ImageRef { uri, caption, ocr_text: None });
            }
            "p" => {
                let text = node.text().collect::<Vec<_>>().join(" ").trim().to_string();
                if !text.is_empty() {
                    out.push(Element::Paragraph { text, style_runs: Vec::new() });
                }
            }
            _ => {
                for child in node.children().filter_map(scraper::ElementRef::wrap) {
                    Self::walk(child, next_inside_content, out);
                }
            }
        }
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Parser for HtmlParser {
    fn supported_mimes(&self) -> &[&'static str] {
        &["text/html", "application/xhtml+xml"]
    }

    async fn parse(&self, document: &RawDocument) -> ParserResult<StructuredDocument> {
        let text = decode_text(&document.bytes)?;
        let html = scraper::Html::parse_document(&text);
        let mut doc = StructuredDocument::new(document.source_id);

        let title_selector = scraper::Selector::parse("title").unwrap();
        if let Some(title_el) = html.select(&title_selector).next() {
            let title = title_el.text().collect::<Vec<_>>().join(" ").trim().to_string();
            if !title.is_empty() {
                doc.title = Some(title);
            }
        }

        let body_selector = scraper::Selector::parse("body").unwrap();
        if let Some(body) = html.select(&body_selector).next() {
            Self::walk(body, false, &mut doc.elements);
        } else {
            Self::walk(html.root_element(), false, &mut doc.elements);
        }

        if doc.elements.is_empty() {
            return Err(ParserError::Malformed("html document produced no elements".into()));
        }

        Ok(doc)
    }

    fn name(&self) -> &'static str {
        "html"
    }
}

/// Treats JSON as data, not markup: each top-level key becomes a heading with its value
/// rendered as a paragraph, so structure survives instead of a `serde_json::to_string` dump.
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        Self
    }

    fn render_value(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => serde_json::to_string_pretty(other).unwrap_or_default(),
        }
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Parser for JsonParser {
    fn supported_mimes(&self) -> &[&'static str] {
        &["application/json"]
    }

    async fn parse(&self, document: &RawDocument) -> ParserResult<StructuredDocument> {
        let text = decode_text(&document.bytes)?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ParserError::Malformed(format!("invalid json: {e}")))?;

        let mut doc = StructuredDocument::new(document.source_id);
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map {
                    doc.elements.push(Element::Heading { level: 2, text: key });
                    let rendered = Self::render_value(&val);
                    if !rendered.is_empty() {
                        doc.elements.push(Element::Paragraph { text: rendered, style_runs: Vec::new() });
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for (i, item) in items.into_iter().enumerate() {
                    doc.elements.push(Element::Heading { level: 2, text: format!("item {i}") });
                    let rendered = Self::render_value(&item);
                    if !rendered.is_empty() {
                        doc.elements.push(Element::Paragraph { text: rendered, style_runs: Vec::new() });
                    }
                }
            }
            other => doc.elements.push(Element::Paragraph { text: Self::render_value(&other), style_runs: Vec::new() }),
        }
        Ok(doc)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Source code: the body becomes one `CodeBlock`, and contiguous comment blocks are lifted
/// out as paragraphs too so they chunk (and embed) like prose.
pub struct CodeParser {
    comment_prefixes: HashMap<&'static str, &'static str>,
}

impl CodeParser {
    pub fn new() -> Self {
        let mut comment_prefixes = HashMap::new();
        comment_prefixes.insert("text/x-rust", "//");
        comment_prefixes.insert("text/x-python", "#");
        comment_prefixes.insert("application/javascript", "//");
        comment_prefixes.insert("text/javascript", "//");
        comment_prefixes.insert("text/x-java-source", "//");
        comment_prefixes.insert("text/x-c", "//");
        comment_prefixes.insert("text/x-c++", "//");
        comment_prefixes.insert("text/x-go", "//");
        comment_prefixes.insert("text/x-ruby", "#");
        comment_prefixes.insert("text/x-shellscript", "#");
        comment_prefixes.insert("application/x-yaml", "#");
        comment_prefixes.insert("text/yaml", "#");
        Self { comment_prefixes }
    }

    fn extract_comments(&self, text: &str, prefix: &str) -> Vec<String> {
        let mut comments = Vec::new();
        let mut current = Vec::new();
        for line in text.lines() {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix(prefix) {
                current.push(rest.trim().to_string());
            } else if !current.is_empty() {
                comments.push(current.join(" "));
                current.clear();
            }
        }
        if !current.is_empty() {
            comments.push(current.join(" "));
        }
        comments.into_iter().filter(|c| !c.is_empty()).collect()
    }
}

impl Default for CodeParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Parser for CodeParser {
    fn supported_mimes(&self) -> &[&'static str] {
        &[
            "text/x-rust",
            "text/x-python",
            "application/javascript",
            "text/javascript",
            "text/x-java-source",
            "text/x-c",
            "text/x-c++",
            "text/x-go",
            "text/x-ruby",
            "text/x-shellscript",
            "application/x-yaml",
            "text/yaml",
        ]
    }

    async fn parse(&self, document: &RawDocument) -> ParserResult<StructuredDocument> {
        let text = decode_text(&document.bytes)?;
        let mut doc = StructuredDocument::new(document.source_id);
        let language = document.mime.strip_prefix("text/x-").or_else(|| document.mime.split('/').last());

        if let Some(prefix) = self.comment_prefixes.get(document.mime.as_str()) {
            for comment in self.extract_comments(&text, prefix) {
                doc.elements.push(Element::Paragraph { text: comment, style_runs: Vec::new() });
            }
        }

        doc.elements.push(Element::CodeBlock { language: language.map(str::to_string), text });
        Ok(doc)
    }

    fn name(&self) -> &'static str {
        "code"
    }
}

/// Dispatches a `RawDocument` to the parser registered for its mime, falling back to
/// [`GenericTextParser`] for anything text-shaped this crate doesn't special-case, and
/// failing with [`ParserError::UnsupportedMime`] for genuinely opaque formats.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn Parser>>,
    fallback: Arc<dyn Parser>,
}

impl ParserRegistry {
    pub fn with_defaults() -> Self {
        Self {
            parsers: vec![
                Arc::new(HtmlParser::new()),
                Arc::new(MarkdownParser::new()),
                Arc::new(JsonParser::new()),
                Arc::new(CodeParser::new()),
            ],
            fallback: Arc::new(GenericTextParser::new()),
        }
    }

    pub fn register(&mut self, parser: Arc<dyn Parser>) {
        self.parsers.push(parser);
    }

    pub async fn parse(&self, document: &RawDocument) -> ParserResult<StructuredDocument> {
        if is_opaque_mime(&document.mime) {
            return Err(ParserError::UnsupportedMime(document.mime.clone()));
        }
        let parser = self
            .parsers
            .iter()
            .find(|p| p.can_handle(&document.mime))
            .unwrap_or(&self.fallback);
        parser.parse(document).await
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::types::SourceId;

    fn doc(mime: &str, bytes: &[u8]) -> RawDocument {
        RawDocument::new(SourceId::new(), "ext-1", "https://example.com", mime, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_registry_rejects_opaque_mime() {
        let registry = ParserRegistry::with_defaults();
        let err = registry.parse(&doc("application/pdf", b"%PDF-1.4")).await.unwrap_err();
        assert!(matches!(err, ParserError::UnsupportedMime(_)));
    }

    #[tokio::test]
    async fn test_generic_fallback_tokenizes_paragraphs() {
        let registry = ParserRegistry::with_defaults();
        let structured = registry
            .parse(&doc("text/plain", b"First paragraph.\n\nSecond paragraph."))
            .await
            .unwrap();
        assert_eq!(structured.elements.len(), 2);
    }

    #[tokio::test]
    async fn test_markdown_preserves_headings_and_code() {
        let parser = MarkdownParser::new();
        let text = "# Title\n\nSome text.\n\n```rust\nfn main() {}\n```\n";
        let structured = parser.parse(&doc("text/markdown", text.as_bytes())).await.unwrap();
        assert!(matches!(structured.elements[0], Element::Heading { level: 1, .. }));
        assert!(structured.elements.iter().any(|e| matches!(e, Element::CodeBlock { .. })));
    }

    #[tokio::test]
    async fn test_markdown_preserves_table() {
        let parser = MarkdownParser::new();
        let text = "| a | b |\n|---|---|\n| 1 | 2 |\n";
        let structured = parser.parse(&doc("text/markdown", text.as_bytes())).await.unwrap();
        assert!(matches!(structured.elements[0], Element::Table { .. }));
    }

    #[tokio::test]
    async fn test_html_drops_script_outside_article() {
        let parser = HtmlParser::new();
        let html = "<html><body><script>evil()</script><p>Hello</p></body></html>";
        let structured = parser.parse(&doc("text/html", html.as_bytes())).await.unwrap();
        assert_eq!(structured.elements.len(), 1);
        assert!(matches!(structured.elements[0], Element::Paragraph { .. }));
    }

    #[tokio::test]
    async fn test_html_preserves_table() {
        let parser = HtmlParser::new();
        let html = "<html><body><table><tr><td>a</td><td>b</td></tr></table></body></html>";
        let structured = parser.parse(&doc("text/html", html.as_bytes())).await.unwrap();
        assert!(matches!(structured.elements[0], Element::Table { .. }));
    }

    #[tokio::test]
    async fn test_json_parser_one_heading_per_key() {
        let parser = JsonParser::new();
        let json = serde_json::json!({"a": "hello", "b": "world"}).to_string();
        let structured = parser.parse(&doc("application/json", json.as_bytes())).await.unwrap();
        let headings = structured.elements.iter().filter(|e| matches!(e, Element::Heading { .. })).count();
        assert_eq!(headings, 2);
    }

    #[tokio::test]
    async fn test_code_parser_extracts_comments_and_body() {
        let parser = CodeParser::new();
        let src = "// a helper\n// still a comment\nfn helper() {}\n";
        let structured = parser.parse(&doc("text/x-rust", src.as_bytes())).await.unwrap();
        assert!(matches!(structured.elements[0], Element::Paragraph { .. }));
        assert!(matches!(structured.elements.last().unwrap(), Element::CodeBlock { .. }));
    }
}
