//! Content cleaning, applied after structural extraction: whitespace normalization, blank-line
//! collapsing, control-character stripping, and de-duplication of identical adjacent blocks.
//! No emoji stripping or link filtering here -- those are optional user-configured passes
//! further down the pipeline, not part of this contract.

use kb_core::model::{Element, StructuredDocument};

pub fn clean_document(doc: &mut StructuredDocument) {
    for element in doc.elements.iter_mut() {
        clean_element(element);
    }
    doc.elements.dedup();
}

fn clean_element(element: &mut Element) {
    match element {
        Element::Heading { text, .. } => *text = clean_text(text),
        Element::Paragraph { text, .. } => *text = clean_text(text),
        Element::ListItem { text, .. } => *text = clean_text(text),
        Element::Table { rows } => {
            for row in rows.iter_mut() {
                for cell in row.iter_mut() {
                    cell.text = clean_text(&cell.text);
                }
            }
        }
        // Code is left verbatim: whitespace is semantically meaningful there.
        Element::CodeBlock { .. } => {}
        Element::ImageRef { caption, ocr_text, .. } => {
            if let Some(c) = caption {
                *c = clean_text(c);
            }
            if let Some(o) = ocr_text {
                *o = clean_text(o);
            }
        }
        Element::Figure { caption, contents } => {
            if let Some(c) = caption {
                *c = clean_text(c);
            }
            for child in contents.iter_mut() {
                clean_element(child);
            }
            contents.dedup();
        }
    }
}

fn is_zero_width(c: char) -> bool {
    matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}')
}

fn clean_text(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|&c| !is_zero_width(c) && (!c.is_control() || c == '\n' || c == '\t'))
        .collect();

    let collapsed = collapse_blank_lines(&stripped);
    normalize_inline_whitespace(&collapsed)
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_blank = false;
    for line in text.lines() {
        let blank = line.trim().is_empty();
        if blank && prev_blank {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
        prev_blank = blank;
    }
    out
}

fn normalize_inline_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_space = false;
    for c in text.chars() {
        if c == '\n' {
            result.push(c);
            prev_space = false;
            continue;
        }
        if c.is_whitespace() {
            if !prev_space {
                result.push(' ');
            }
            prev_space = true;
        } else {
            result.push(c);
            prev_space = false;
        }
    }
    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::types::SourceId;

    #[test]
    fn test_clean_text_normalizes_whitespace() {
        assert_eq!(clean_text("hello   world  "), "hello world");
    }

    #[test]
    fn test_clean_text_collapses_blank_lines() {
        let cleaned = clean_text("a\n\n\n\nb");
        assert_eq!(cleaned, "a\n\nb");
    }

    #[test]
    fn test_clean_text_strips_zero_width() {
        assert_eq!(clean_text("a\u{200B}b"), "ab");
    }

    #[test]
    fn test_clean_document_dedupes_identical_paragraphs() {
        let mut doc = StructuredDocument::new(SourceId::new());
        doc.elements.push(Element::Paragraph { text: "same".into(), style_runs: Vec::new() });
        doc.elements.push(Element::Paragraph { text: "same".into(), style_runs: Vec::new() });
        doc.elements.push(Element::Paragraph { text: "different".into(), style_runs: Vec::new() });
        clean_document(&mut doc);
        assert_eq!(doc.elements.len(), 2);
    }
}
