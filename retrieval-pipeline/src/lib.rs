#![allow(clippy::missing_docs_in_private_items)]

use common::{
    error::AppError,
    settings::EffectiveConfig,
    storage::{
        db::SurrealDbClient,
        types::{document::Document, text_chunk::TextChunk},
    },
};
use serde_json::Value;
use tracing::instrument;

/// Context chunks fetched for chat answers.
pub const CHAT_RETRIEVAL_K: usize = 6;
/// Context chunks fetched for artifact generation.
pub const GENERATION_RETRIEVAL_K: usize = 12;

// Captures a supporting chunk plus its similarity score for downstream prompts.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// Workspace-scoped semantic retrieval under the effective embedding
/// fingerprint.
///
/// Vector distance is meaningless across models, so a workspace whose
/// completed documents carry a different fingerprint than the effective one
/// is refused outright rather than silently returning junk. The error names
/// the offending documents so the caller can surface a remediation (reprocess
/// or switch settings back).
#[instrument(skip_all, fields(workspace_id, k))]
pub async fn retrieve(
    db: &SurrealDbClient,
    effective: &EffectiveConfig,
    workspace_id: &str,
    query: &str,
    k: usize,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let fingerprints = Document::fingerprints(workspace_id, db).await?;
    if fingerprints.is_empty() {
        return Err(AppError::NotFound(
            "no completed documents in this workspace".into(),
        ));
    }

    let mismatched: Vec<String> = fingerprints
        .iter()
        .filter(|(fingerprint, _)| {
            fingerprint.embedding_provider != effective.embedding_provider
                || fingerprint.embedding_model != effective.embedding_model
        })
        .flat_map(|(_, titles)| titles.iter().cloned())
        .collect();
    if !mismatched.is_empty() {
        return Err(AppError::IncompatibleEmbeddings {
            documents: mismatched,
        });
    }

    let embedder = effective.build_embedder().await?;
    let query_embedding = embedder.embed(query).await?;
    let dimension = u32::try_from(embedder.dimension()).unwrap_or(u32::MAX);

    let results = TextChunk::vector_search(workspace_id, query_embedding, dimension, k, db).await?;

    Ok(results
        .into_iter()
        .map(|result| RetrievedChunk {
            chunk: result.chunk,
            score: result.score,
        })
        .collect())
}

/// Convert retrieval results to the labeled JSON block included in prompts.
pub fn chunks_to_context(chunks: &[RetrievedChunk]) -> Value {
    fn round_score(value: f32) -> f64 {
        (f64::from(value) * 1000.0).round() / 1000.0
    }

    serde_json::json!(chunks
        .iter()
        .map(|entry| {
            serde_json::json!({
                "document_id": entry.chunk.document_id,
                "ordinal": entry.chunk.ordinal,
                "content": entry.chunk.content,
                "score": round_score(entry.score),
            })
        })
        .collect::<Vec<_>>())
}
