//! Document loading and splitting.
//!
//! Turns source material into `(id, content, metadata)` documents ready
//! for the indexing pipeline: one document per non-empty PDF page, plus a
//! word-boundary splitter for oversized content.

use std::path::Path;

use crate::document::Document;
use crate::error::{Error, Result};

/// Load a PDF into one document per non-empty page.
///
/// Ids are `{stem}_page{n}`; `source` and `page` metadata record where the
/// content came from.
pub fn load_pdf(path: &Path) -> Result<Vec<Document>> {
    let pages = pdf_extract::extract_text_by_pages(path)
        .map_err(|e| Error::Loader(format!("failed to extract {}: {}", path.display(), e)))?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");

    let mut docs = Vec::new();
    for (i, text) in pages.iter().enumerate() {
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        docs.push(
            Document::new(format!("{}_page{}", stem, i + 1), text)
                .with_metadata("source", path.display().to_string())
                .with_metadata("page", (i + 1) as i64),
        );
    }
    Ok(docs)
}

/// Split oversized documents into overlapping pieces on word boundaries.
///
/// Documents within the budget pass through unchanged, id included. Pieces
/// get ids `{id}_chunk{n}`, inherit their parent's metadata, and record
/// their index under `chunk`.
pub fn split_documents(docs: &[Document], max_chars: usize, overlap_chars: usize) -> Vec<Document> {
    let mut out = Vec::new();
    for doc in docs {
        if doc.content.len() <= max_chars {
            out.push(doc.clone());
            continue;
        }

        for (i, piece) in split_text(&doc.content, max_chars, overlap_chars)
            .into_iter()
            .enumerate()
        {
            let mut split = Document::new(format!("{}_chunk{}", doc.id, i + 1), piece);
            split.metadata = doc.metadata.clone();
            split
                .metadata
                .insert("chunk".into(), serde_json::json!(i + 1));
            out.push(split);
        }
    }
    out
}

fn split_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let would_be = if current.is_empty() {
            word.len()
        } else {
            current.len() + 1 + word.len()
        };

        if would_be > max_chars && !current.is_empty() {
            let tail = overlap_tail(&current, overlap);
            pieces.push(std::mem::take(&mut current));
            current = tail;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Last `overlap` bytes of a piece, snapped forward to a word boundary.
fn overlap_tail(piece: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    if piece.len() <= overlap {
        return piece.to_string();
    }

    let mut start = piece.len() - overlap;
    while !piece.is_char_boundary(start) {
        start += 1;
    }

    match piece[start..].find(' ') {
        Some(space) => piece[start + space + 1..].to_string(),
        None => piece[start..].to_string(),
    }
}
