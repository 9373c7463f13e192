use common::error::AppError;
use text_splitter::{ChunkConfig, TextSplitter};

/// Splits one source unit's text into overlapping chunks. The splitter
/// prefers paragraph boundaries, then sentences, then words, and never
/// exceeds `capacity` characters per chunk. Empty chunks are discarded.
pub fn chunk_text(text: &str, capacity: usize, overlap: usize) -> Result<Vec<String>, AppError> {
    let config = ChunkConfig::new(capacity)
        .with_overlap(overlap)
        .map_err(|err| AppError::Processing(format!("Invalid chunking configuration: {err}")))?;
    let splitter = TextSplitter::new(config);

    Ok(splitter
        .chunks(text)
        .map(str::to_string)
        .filter(|chunk| !chunk.trim().is_empty())
        .collect())
}
