//! Splits a [`StructuredDocument`] into ordered [`Chunk`] payloads under one of nine
//! strategies. Every strategy preserves `element_path` back to the source element(s) and
//! attaches a `heading_trail` built from enclosing headings.

use async_trait::async_trait;
use kb_core::model::{Element, StructuredDocument, TableCell};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::{IngestionError, Result};

/// Type-erased sentence embedder, used only by the `semantic`/`hybrid` strategies to find
/// topic breaks. The same model that embeds chunks for indexing is expected to satisfy
/// this at the orchestration layer; kept dyn-compatible here since `kb_core::Embedder`'s
/// associated `Error` type isn't object-safe.
#[async_trait]
pub trait SentenceEmbedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    Recursive,
    Sentence,
    Token,
    ByHeading,
    BySection,
    Semantic,
    Paragraph,
    Adaptive,
    Hybrid,
}

impl Default for ChunkingStrategy {
    fn default() -> Self {
        Self::Recursive
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub strategy: ChunkingStrategy,
    /// Characters, unless `strategy` is `token`, in which case tokens.
    pub target_size: usize,
    pub overlap: usize,
    pub preserve_structure: bool,
    /// Similarity threshold for `semantic`/`hybrid` grouping (tau, default 0.75).
    pub semantic_threshold: f32,
    /// Adjacent-similarity drop that forces a break (delta, default 0.2).
    pub semantic_delta: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::default(),
            target_size: 1000,
            overlap: 200,
            preserve_structure: true,
            semantic_threshold: 0.75,
            semantic_delta: 0.2,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(100..=8000).contains(&self.target_size) {
            return Err(IngestionError::ValidationError(format!(
                "target_size {} must be within 100..=8000",
                self.target_size
            )));
        }
        if self.overlap >= self.target_size {
            return Err(IngestionError::ValidationError(
                "overlap must be smaller than target_size".into(),
            ));
        }
        if self.overlap > self.target_size / 2 {
            return Err(IngestionError::ValidationError(format!(
                "overlap {} exceeds half of target_size {}",
                self.overlap, self.target_size
            )));
        }
        Ok(())
    }

    pub fn with_strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_target_size(mut self, target_size: usize) -> Self {
        self.target_size = target_size;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub heading_trail: Vec<String>,
    pub oversized: bool,
    pub page: Option<u32>,
    pub table_id: Option<String>,
    pub annotations: Vec<String>,
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub ordinal: u32,
    pub content: String,
    pub element_path: Vec<usize>,
    pub token_count: usize,
    pub char_count: usize,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Prose,
    Structural,
}

#[derive(Debug, Clone)]
struct Block {
    element_path: Vec<usize>,
    heading_trail: Vec<String>,
    kind: BlockKind,
    text: String,
}

#[derive(Debug, Clone)]
struct Atom {
    element_path: Vec<usize>,
    heading_trail: Vec<String>,
    text: String,
    oversized: bool,
}

fn render_table_markdown(rows: &[Vec<TableCell>]) -> String {
    let mut lines = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<&str> = row.iter().map(|c| c.text.as_str()).collect();
        lines.push(format!("| {} |", cells.join(" | ")));
        if i == 0 {
            let sep = vec!["---"; row.len()].join(" | ");
            lines.push(format!("| {sep} |"));
        }
    }
    lines.join("\n")
}

fn render_code(language: Option<&str>, text: &str) -> String {
    match language {
        Some(lang) => format!("```{lang}\n{text}\n```"),
        None => format!("```\n{text}\n```"),
    }
}

fn flatten_elements(
    elements: &[Element],
    path: &mut Vec<usize>,
    trail: &mut Vec<(u8, String)>,
    out: &mut Vec<Block>,
) {
    for (i, element) in elements.iter().enumerate() {
        path.push(i);
        match element {
            Element::Heading { level, text } => {
                while trail.last().map(|(l, _)| *l >= *level).unwrap_or(false) {
                    trail.pop();
                }
                trail.push((*level, text.clone()));
                out.push(Block {
                    element_path: path.clone(),
                    heading_trail: trail.iter().map(|(_, t)| t.clone()).collect(),
                    kind: BlockKind::Prose,
                    text: text.clone(),
                });
            }
            Element::Paragraph { text, .. } => out.push(Block {
                element_path: path.clone(),
                heading_trail: trail.iter().map(|(_, t)| t.clone()).collect(),
                kind: BlockKind::Prose,
                text: text.clone(),
            }),
            Element::ListItem { text, .. } => out.push(Block {
                element_path: path.clone(),
                heading_trail: trail.iter().map(|(_, t)| t.clone()).collect(),
                kind: BlockKind::Structural,
                text: format!("- {text}"),
            }),
            Element::Table { rows } => out.push(Block {
                element_path: path.clone(),
                heading_trail: trail.iter().map(|(_, t)| t.clone()).collect(),
                kind: BlockKind::Structural,
                text: render_table_markdown(rows),
            }),
            Element::CodeBlock { language, text } => out.push(Block {
                element_path: path.clone(),
                heading_trail: trail.iter().map(|(_, t)| t.clone()).collect(),
                kind: BlockKind::Structural,
                text: render_code(language.as_deref(), text),
            }),
            Element::ImageRef { uri, caption, ocr_text } => {
                let mut text = format!("![{}]({})", caption.clone().unwrap_or_default(), uri);
                if let Some(ocr) = ocr_text {
                    text.push('\n');
                    text.push_str(ocr);
                }
                out.push(Block {
                    element_path: path.clone(),
                    heading_trail: trail.iter().map(|(_, t)| t.clone()).collect(),
                    kind: BlockKind::Structural,
                    text,
                });
            }
            Element::Figure { caption, contents } => {
                if let Some(caption) = caption {
                    out.push(Block {
                        element_path: path.clone(),
                        heading_trail: trail.iter().map(|(_, t)| t.clone()).collect(),
                        kind: BlockKind::Prose,
                        text: caption.clone(),
                    });
                }
                flatten_elements(contents, path, trail, out);
            }
        }
        path.pop();
    }
}

fn flatten(doc: &StructuredDocument) -> Vec<Block> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    let mut trail = Vec::new();
    flatten_elements(&doc.elements, &mut path, &mut trail, &mut out);
    out
}

/// Sentence-boundary heuristic: split after `.`/`!`/`?` followed by whitespace and a
/// capital letter or end of string, without breaking on common abbreviations.
fn split_into_sentences(text: &str) -> Vec<String> {
    let abbreviations = ["mr.", "mrs.", "dr.", "ms.", "prof.", "sr.", "jr.", "vs.", "e.g.", "i.e.", "etc."];
    let mut sentences = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        current.push(c);
        if c == '.' || c == '!' || c == '?' {
            let lower = current.to_lowercase();
            let is_abbreviation = abbreviations.iter().any(|a| lower.trim_end().ends_with(a));
            let next_is_boundary = i + 1 >= chars.len()
                || (chars[i + 1].is_whitespace()
                    && chars.get(i + 2).map(|c| c.is_uppercase() || c.is_numeric()).unwrap_or(true));
            if !is_abbreviation && next_is_boundary {
                sentences.push(current.trim().to_string());
                current.clear();
            }
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences.into_iter().filter(|s| !s.is_empty()).collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Expands a block into one or more atoms. When `allow_split` is false an oversized block
/// becomes a single flagged atom rather than being torn apart -- this is the
/// `preserve_structure` contract: a table, code block, list item or paragraph stays whole.
fn expand_block(block: &Block, target: usize, allow_split: bool, measure: &dyn Fn(&str) -> usize) -> Vec<Atom> {
    if measure(&block.text) <= target {
        return vec![Atom {
            element_path: block.element_path.clone(),
            heading_trail: block.heading_trail.clone(),
            text: block.text.clone(),
            oversized: false,
        }];
    }
    if !allow_split {
        return vec![Atom {
            element_path: block.element_path.clone(),
            heading_trail: block.heading_trail.clone(),
            text: block.text.clone(),
            oversized: true,
        }];
    }

    let mut atoms = Vec::new();
    for sentence in split_into_sentences(&block.text) {
        if measure(&sentence) <= target {
            atoms.push(Atom {
                element_path: block.element_path.clone(),
                heading_trail: block.heading_trail.clone(),
                text: sentence,
                oversized: false,
            });
            continue;
        }
        // Still too big: fall back to word splitting.
        let mut buf = String::new();
        for word in sentence.split_whitespace() {
            let candidate = if buf.is_empty() { word.to_string() } else { format!("{buf} {word}") };
            if measure(&candidate) > target && !buf.is_empty() {
                atoms.push(Atom {
                    element_path: block.element_path.clone(),
                    heading_trail: block.heading_trail.clone(),
                    text: buf.clone(),
                    oversized: false,
                });
                buf = word.to_string();
            } else {
                buf = candidate;
            }
        }
        if !buf.is_empty() {
            atoms.push(Atom {
                element_path: block.element_path.clone(),
                heading_trail: block.heading_trail.clone(),
                text: buf,
                oversized: false,
            });
        }
    }
    if atoms.is_empty() {
        atoms.push(Atom {
            element_path: block.element_path.clone(),
            heading_trail: block.heading_trail.clone(),
            text: block.text.clone(),
            oversized: true,
        });
    }
    atoms
}

fn take_trailing(text: &str, overlap: usize, measure: &dyn Fn(&str) -> usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut acc: Vec<&str> = Vec::new();
    for word in words.into_iter().rev() {
        acc.push(word);
        let candidate = acc.iter().rev().cloned().collect::<Vec<_>>().join(" ");
        if measure(&candidate) > overlap {
            acc.pop();
            break;
        }
    }
    acc.into_iter().rev().collect::<Vec<_>>().join(" ")
}

fn make_chunk(path: &[usize], trail: &[String], text: &str, oversized: bool) -> Chunk {
    Chunk {
        id: String::new(),
        document_id: String::new(),
        ordinal: 0,
        content: text.trim().to_string(),
        element_path: path.to_vec(),
        token_count: 0,
        char_count: char_len(text.trim()),
        metadata: ChunkMetadata {
            heading_trail: trail.to_vec(),
            oversized,
            page: None,
            table_id: None,
            annotations: Vec::new(),
            extra: HashMap::new(),
        },
    }
}

fn pack_atoms(atoms: &[Atom], target: usize, overlap: usize, measure: &dyn Fn(&str) -> usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current_text = String::new();
    let mut current_path: Vec<usize> = Vec::new();
    let mut current_trail: Vec<String> = Vec::new();

    for atom in atoms {
        if atom.oversized {
            if !current_text.trim().is_empty() {
                chunks.push(make_chunk(&current_path, &current_trail, &current_text, false));
                current_text.clear();
            }
            chunks.push(make_chunk(&atom.element_path, &atom.heading_trail, &atom.text, true));
            continue;
        }

        let candidate = if current_text.is_empty() {
            atom.text.clone()
        } else {
            format!("{current_text}\n\n{}", atom.text)
        };

        if measure(&candidate) > target && !current_text.is_empty() {
            chunks.push(make_chunk(&current_path, &current_trail, &current_text, false));
            let carried = take_trailing(&current_text, overlap, measure);
            current_text = if carried.is_empty() { atom.text.clone() } else { format!("{carried}\n\n{}", atom.text) };
            current_path = atom.element_path.clone();
            current_trail = atom.heading_trail.clone();
        } else {
            if current_text.is_empty() {
                current_path = atom.element_path.clone();
                current_trail = atom.heading_trail.clone();
            }
            current_text = candidate;
        }
    }
    if !current_text.trim().is_empty() {
        chunks.push(make_chunk(&current_path, &current_trail, &current_text, false));
    }
    chunks
}

fn extract_annotations(doc: &StructuredDocument) -> Vec<String> {
    doc.metadata
        .get("annotations")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

/// Groups blocks into heading-delimited sections. The leading group (before any heading)
/// is its own section.
fn group_by_heading(blocks: &[Block]) -> Vec<Vec<Block>> {
    let mut sections: Vec<Vec<Block>> = Vec::new();
    for block in blocks {
        let is_heading_block = block.heading_trail.last().map(|h| h == &block.text).unwrap_or(false);
        if sections.is_empty() || is_heading_block {
            sections.push(vec![block.clone()]);
        } else {
            sections.last_mut().unwrap().push(block.clone());
        }
    }
    sections
}

pub struct TextChunker {
    config: ChunkingConfig,
    bpe: Option<tiktoken_rs::CoreBPE>,
    embedder: Option<Arc<dyn SentenceEmbedder>>,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, bpe: tiktoken_rs::cl100k_base().ok(), embedder: None })
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn SentenceEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    fn count_tokens(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            None => ((char_len(text) as f32) / 4.0).ceil() as usize,
        }
    }

    pub async fn chunk(&self, document_id: &str, doc: &StructuredDocument) -> Result<Vec<Chunk>> {
        let blocks = flatten(doc);
        if blocks.is_empty() {
            return Ok(Vec::new());
        }

        let mut strategy = self.config.strategy;
        if matches!(strategy, ChunkingStrategy::Semantic | ChunkingStrategy::Hybrid) && self.embedder.is_none() {
            tracing::warn!(
                document_id,
                strategy = ?strategy,
                "no embedder configured; falling back to recursive chunking"
            );
            strategy = ChunkingStrategy::Recursive;
        }

        let mut chunks = match strategy {
            ChunkingStrategy::Recursive => self.chunk_recursive(&blocks),
            ChunkingStrategy::Paragraph => self.chunk_paragraph(&blocks),
            ChunkingStrategy::Sentence => self.chunk_sentence(&blocks),
            ChunkingStrategy::Token => self.chunk_token(&blocks),
            ChunkingStrategy::ByHeading => self.chunk_by_heading(&blocks),
            ChunkingStrategy::BySection => self.chunk_by_section(&blocks),
            ChunkingStrategy::Adaptive => self.chunk_adaptive(&blocks, doc),
            ChunkingStrategy::Semantic => self.chunk_semantic(&blocks).await?,
            ChunkingStrategy::Hybrid => self.chunk_hybrid(&blocks).await?,
        };

        let annotations = extract_annotations(doc);
        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.ordinal = i as u32;
            chunk.id = format!("{document_id}_{i}");
            chunk.document_id = document_id.to_string();
            chunk.token_count = self.count_tokens(&chunk.content);
            chunk.metadata.annotations = annotations.clone();
        }
        Ok(chunks)
    }

    fn chunk_recursive(&self, blocks: &[Block]) -> Vec<Chunk> {
        let target = self.config.target_size;
        let measure = char_len;
        let atoms: Vec<Atom> = blocks
            .iter()
            .flat_map(|b| expand_block(b, target, !self.config.preserve_structure, &measure))
            .collect();
        pack_atoms(&atoms, target, self.config.overlap, &measure)
    }

    fn chunk_paragraph(&self, blocks: &[Block]) -> Vec<Chunk> {
        let target = self.config.target_size;
        let measure = char_len;
        // Paragraph strategy never splits a block -- oversized paragraphs stand alone.
        let atoms: Vec<Atom> = blocks.iter().flat_map(|b| expand_block(b, target, false, &measure)).collect();
        pack_atoms(&atoms, target, self.config.overlap, &measure)
    }

    fn chunk_sentence(&self, blocks: &[Block]) -> Vec<Chunk> {
        let target = self.config.target_size;
        let measure = char_len;
        let atoms: Vec<Atom> = blocks
            .iter()
            .flat_map(|b| {
                let allow_split = b.kind == BlockKind::Prose || !self.config.preserve_structure;
                expand_block(b, target, allow_split, &measure)
            })
            .collect();
        pack_atoms(&atoms, target, self.config.overlap, &measure)
    }

    fn chunk_token(&self, blocks: &[Block]) -> Vec<Chunk> {
        let target = self.config.target_size;
        let bpe = &self.bpe;
        let measure = move |s: &str| match bpe {
            Some(b) => b.encode_ordinary(s).len(),
            None => ((char_len(s) as f32) / 4.0).ceil() as usize,
        };
        let atoms: Vec<Atom> = blocks
            .iter()
            .flat_map(|b| {
                let allow_split = b.kind == BlockKind::Prose || !self.config.preserve_structure;
                expand_block(b, target, allow_split, &measure)
            })
            .collect();
        pack_atoms(&atoms, target, self.config.overlap, &measure)
    }

    fn chunk_by_heading(&self, blocks: &[Block]) -> Vec<Chunk> {
        self.chunk_sectioned(blocks, true)
    }

    fn chunk_by_section(&self, blocks: &[Block]) -> Vec<Chunk> {
        self.chunk_sectioned(blocks, false)
    }

    fn chunk_sectioned(&self, blocks: &[Block], allow_merge: bool) -> Vec<Chunk> {
        let target = self.config.target_size;
        let measure = char_len;
        let sections = group_by_heading(blocks);

        let mut chunks: Vec<Chunk> = Vec::new();
        for section in &sections {
            let combined: String = section.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join("\n\n");
            if measure(&combined) <= target {
                let path = section.first().map(|b| b.element_path.clone()).unwrap_or_default();
                let trail = section.first().map(|b| b.heading_trail.clone()).unwrap_or_default();
                chunks.push(make_chunk(&path, &trail, &combined, false));
            } else {
                let atoms: Vec<Atom> = section
                    .iter()
                    .flat_map(|b| expand_block(b, target, !self.config.preserve_structure, &measure))
                    .collect();
                chunks.extend(pack_atoms(&atoms, target, self.config.overlap, &measure));
            }
        }

        if allow_merge {
            merge_small_adjacent_sections(chunks, target)
        } else {
            chunks
        }
    }

    fn chunk_adaptive(&self, blocks: &[Block], doc: &StructuredDocument) -> Vec<Chunk> {
        let total_chars: usize = blocks.iter().map(|b| char_len(&b.text)).sum();
        let heading_count = doc
            .elements
            .iter()
            .filter(|e| matches!(e, Element::Heading { .. }))
            .count();
        let heading_density = if total_chars == 0 { 0.0 } else { heading_count as f64 / total_chars as f64 };

        let paragraph_lengths: Vec<usize> = doc
            .elements
            .iter()
            .filter_map(|e| match e {
                Element::Paragraph { text, .. } => Some(char_len(text)),
                _ => None,
            })
            .collect();
        let mean_paragraph_len = if paragraph_lengths.is_empty() {
            0
        } else {
            paragraph_lengths.iter().sum::<usize>() / paragraph_lengths.len()
        };

        if heading_density >= 1.0 / 800.0 {
            self.chunk_by_heading(blocks)
        } else if mean_paragraph_len <= self.config.target_size {
            self.chunk_paragraph(blocks)
        } else {
            self.chunk_recursive(blocks)
        }
    }

    async fn chunk_semantic(&self, blocks: &[Block]) -> Result<Vec<Chunk>> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| IngestionError::ChunkingFailed("semantic chunking requires an embedder".into()))?;

        let target = self.config.target_size;
        let measure = char_len;
        let atoms: Vec<Atom> = blocks
            .iter()
            .flat_map(|b| {
                let allow_split = b.kind == BlockKind::Prose || !self.config.preserve_structure;
                expand_block(b, target, allow_split, &measure)
            })
            .collect();
        self.group_atoms_semantically(&atoms, embedder.as_ref()).await
    }

    async fn chunk_hybrid(&self, blocks: &[Block]) -> Result<Vec<Chunk>> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| IngestionError::ChunkingFailed("hybrid chunking requires an embedder".into()))?;

        let target = self.config.target_size;
        let measure = char_len;
        let sections = group_by_heading(blocks);
        let mut chunks = Vec::new();
        for section in &sections {
            let combined: String = section.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join("\n\n");
            if measure(&combined) <= target {
                let path = section.first().map(|b| b.element_path.clone()).unwrap_or_default();
                let trail = section.first().map(|b| b.heading_trail.clone()).unwrap_or_default();
                chunks.push(make_chunk(&path, &trail, &combined, false));
                continue;
            }
            let atoms: Vec<Atom> = section
                .iter()
                .flat_map(|b| {
                    let allow_split = b.kind == BlockKind::Prose || !self.config.preserve_structure;
                    expand_block(b, target, allow_split, &measure)
                })
                .collect();
            chunks.extend(self.group_atoms_semantically(&atoms, embedder.as_ref()).await?);
        }
        Ok(chunks)
    }

    async fn group_atoms_semantically(&self, atoms: &[Atom], embedder: &dyn SentenceEmbedder) -> Result<Vec<Chunk>> {
        if atoms.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = atoms.iter().map(|a| a.text.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| IngestionError::ChunkingFailed(format!("embedding failed: {e}")))?;
        if embeddings.len() != atoms.len() {
            return Err(IngestionError::ChunkingFailed("embedder returned mismatched batch size".into()));
        }

        let target = self.config.target_size;
        let tau = self.config.semantic_threshold;
        let delta = self.config.semantic_delta;
        let mut chunks = Vec::new();
        let mut current_text = String::new();
        let mut current_path: Vec<usize> = Vec::new();
        let mut current_trail: Vec<String> = Vec::new();
        let mut prev_sim: Option<f32> = None;

        for (i, atom) in atoms.iter().enumerate() {
            if atom.oversized {
                if !current_text.trim().is_empty() {
                    chunks.push(make_chunk(&current_path, &current_trail, &current_text, false));
                    current_text.clear();
                    prev_sim = None;
                }
                chunks.push(make_chunk(&atom.element_path, &atom.heading_trail, &atom.text, true));
                continue;
            }

            let sim = if i == 0 { None } else { Some(cosine_similarity(&embeddings[i - 1], &embeddings[i])) };
            let drop_too_sharp = match (prev_sim, sim) {
                (Some(p), Some(s)) => (p - s) > delta,
                _ => false,
            };
            let below_threshold = sim.map(|s| s < tau).unwrap_or(false);
            let candidate = if current_text.is_empty() {
                atom.text.clone()
            } else {
                format!("{current_text}\n\n{}", atom.text)
            };

            if !current_text.is_empty() && (char_len(&candidate) > target || below_threshold || drop_too_sharp) {
                chunks.push(make_chunk(&current_path, &current_trail, &current_text, false));
                current_text = atom.text.clone();
                current_path = atom.element_path.clone();
                current_trail = atom.heading_trail.clone();
            } else {
                if current_text.is_empty() {
                    current_path = atom.element_path.clone();
                    current_trail = atom.heading_trail.clone();
                }
                current_text = candidate;
            }
            prev_sim = sim;
        }
        if !current_text.trim().is_empty() {
            chunks.push(make_chunk(&current_path, &current_trail, &current_text, false));
        }
        Ok(chunks)
    }
}

fn merge_small_adjacent_sections(chunks: Vec<Chunk>, target: usize) -> Vec<Chunk> {
    let threshold = target / 4;
    let mut merged: Vec<Chunk> = Vec::new();
    for chunk in chunks {
        if let Some(last) = merged.last_mut() {
            let same_parent = parent_trail(&last.metadata.heading_trail) == parent_trail(&chunk.metadata.heading_trail);
            if same_parent
                && last.char_count < threshold
                && chunk.char_count < threshold
                && last.char_count + chunk.char_count <= target
            {
                last.content = format!("{}\n\n{}", last.content, chunk.content);
                last.char_count = char_len(&last.content);
                continue;
            }
        }
        merged.push(chunk);
    }
    merged
}

fn parent_trail(trail: &[String]) -> &[String] {
    if trail.is_empty() {
        trail
    } else {
        &trail[..trail.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::types::SourceId;

    fn doc_with(elements: Vec<Element>) -> StructuredDocument {
        let mut doc = StructuredDocument::new(SourceId::new());
        doc.elements = elements;
        doc
    }

    fn para(text: &str) -> Element {
        Element::Paragraph { text: text.to_string(), style_runs: Vec::new() }
    }

    #[test]
    fn test_config_rejects_out_of_range_target_size() {
        let config = ChunkingConfig::default().with_target_size(50);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_overlap_past_half() {
        let config = ChunkingConfig::default().with_target_size(1000).with_overlap(600);
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_paragraph_strategy_one_chunk_per_paragraph() {
        let doc = doc_with(vec![para("First paragraph here."), para("Second paragraph here.")]);
        let chunker = TextChunker::new(
            ChunkingConfig::default().with_strategy(ChunkingStrategy::Paragraph).with_target_size(5).with_overlap(0),
        )
        .unwrap();
        let chunks = chunker.chunk("doc1", &doc).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.metadata.oversized));
    }

    #[tokio::test]
    async fn test_recursive_strategy_respects_target_size() {
        let doc = doc_with(vec![para(&"word ".repeat(500))]);
        let chunker = TextChunker::new(
            ChunkingConfig::default().with_strategy(ChunkingStrategy::Recursive).with_target_size(200).with_overlap(20),
        )
        .unwrap();
        let chunks = chunker.chunk("doc1", &doc).await.unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.char_count <= 220));
    }

    #[tokio::test]
    async fn test_by_heading_produces_one_chunk_per_section() {
        let doc = doc_with(vec![
            Element::Heading { level: 1, text: "Intro".into() },
            para("Some intro text."),
            Element::Heading { level: 1, text: "Details".into() },
            para("Some detail text."),
        ]);
        let chunker = TextChunker::new(
            ChunkingConfig::default().with_strategy(ChunkingStrategy::ByHeading).with_target_size(1000).with_overlap(100),
        )
        .unwrap();
        let chunks = chunker.chunk("doc1", &doc).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[1].ordinal, 1);
    }

    #[tokio::test]
    async fn test_oversized_table_is_flagged() {
        let rows = vec![vec![TableCell { text: "x".repeat(5000), col_span: 1, row_span: 1 }]];
        let doc = doc_with(vec![Element::Table { rows }]);
        let chunker = TextChunker::new(
            ChunkingConfig::default().with_strategy(ChunkingStrategy::Recursive).with_target_size(1000).with_overlap(100),
        )
        .unwrap();
        let chunks = chunker.chunk("doc1", &doc).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].metadata.oversized);
    }

    #[tokio::test]
    async fn test_sentence_strategy_packs_sentences() {
        let doc = doc_with(vec![para("One. Two. Three. Four. Five.")]);
        let chunker = TextChunker::new(
            ChunkingConfig::default().with_strategy(ChunkingStrategy::Sentence).with_target_size(100).with_overlap(0),
        )
        .unwrap();
        let chunks = chunker.chunk("doc1", &doc).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.contains("Five."));
    }

    #[tokio::test]
    async fn test_empty_document_produces_no_chunks() {
        let doc = doc_with(vec![]);
        let chunker = TextChunker::new(ChunkingConfig::default()).unwrap();
        let chunks = chunker.chunk("doc1", &doc).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_falls_back_to_recursive_without_embedder() {
        let doc = doc_with(vec![para("Some prose that would normally need an embedder.")]);
        let chunker = TextChunker::new(
            ChunkingConfig::default().with_strategy(ChunkingStrategy::Semantic).with_target_size(1000).with_overlap(100),
        )
        .unwrap();
        let chunks = chunker.chunk("doc1", &doc).await.unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_chunk_ids_are_stable_format() {
        let chunk = make_chunk(&[0], &[], "hello", false);
        assert_eq!(chunk.content, "hello");
    }
}
