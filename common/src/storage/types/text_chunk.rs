use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(TextChunk, "text_chunk", {
    document_id: String,
    workspace_id: String,
    ordinal: u32,
    content: String,
    metadata: serde_json::Value,
    embedding: Vec<f32>,
    dimension: u32
});

/// Search result including hydrated chunk.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TextChunkSearchResult {
    pub chunk: TextChunk,
    pub score: f32,
}

impl TextChunk {
    pub fn new(
        document_id: String,
        workspace_id: String,
        ordinal: u32,
        content: String,
        metadata: serde_json::Value,
        embedding: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        let dimension = u32::try_from(embedding.len()).unwrap_or(u32::MAX);
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document_id,
            workspace_id,
            ordinal,
            content,
            metadata,
            embedding,
            dimension,
        }
    }

    /// Stores all chunks of a document in a single transaction so readers
    /// never observe a partially written set.
    pub async fn insert_all(chunks: Vec<TextChunk>, db: &SurrealDbClient) -> Result<(), AppError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let response = db
            .client
            .query("BEGIN TRANSACTION;")
            .query(format!(
                "FOR $chunk IN $chunks {{ CREATE type::thing('{table}', $chunk.id) CONTENT $chunk; }};",
                table = Self::table_name(),
            ))
            .query("COMMIT TRANSACTION;")
            .bind(("chunks", chunks))
            .await
            .map_err(AppError::Database)?;

        response.check().map_err(AppError::Database)?;

        Ok(())
    }

    pub async fn delete_by_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query("DELETE type::table($table) WHERE document_id = $document_id")
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn count_by_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        #[derive(Deserialize)]
        struct Row {
            total: usize,
        }

        let rows: Vec<Row> = db
            .query(
                "SELECT count() AS total FROM type::table($table) WHERE document_id = $document_id GROUP ALL",
            )
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_string()))
            .await?
            .take(0)?;

        Ok(rows.first().map_or(0, |row| row.total))
    }

    /// Cosine-similarity search within one workspace, restricted to a single
    /// embedding dimension. Ties resolve by `(document_id, ordinal)` so
    /// results are deterministic.
    ///
    /// The scan is explicit rather than HNSW-indexed: documents embedded under
    /// different models may coexist in one table, and a fixed-dimension index
    /// cannot hold them.
    pub async fn vector_search(
        workspace_id: &str,
        query_embedding: Vec<f32>,
        dimension: u32,
        take: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<TextChunkSearchResult>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            #[serde(deserialize_with = "deserialize_flexible_id")]
            id: String,
            #[serde(deserialize_with = "deserialize_datetime")]
            created_at: DateTime<Utc>,
            #[serde(deserialize_with = "deserialize_datetime")]
            updated_at: DateTime<Utc>,
            document_id: String,
            workspace_id: String,
            ordinal: u32,
            content: String,
            metadata: serde_json::Value,
            embedding: Vec<f32>,
            dimension: u32,
            score: f32,
        }

        let sql = format!(
            r#"
            SELECT
                *,
                vector::similarity::cosine(embedding, $embedding) AS score
            FROM {table}
            WHERE workspace_id = $workspace_id
              AND dimension = $dimension
            ORDER BY score DESC, document_id ASC, ordinal ASC
            LIMIT {take};
            "#,
            table = Self::table_name(),
            take = take
        );

        let mut response = db
            .query(&sql)
            .bind(("embedding", query_embedding))
            .bind(("workspace_id", workspace_id.to_string()))
            .bind(("dimension", dimension))
            .await
            .map_err(|e| AppError::InternalError(format!("Surreal query failed: {e}")))?;

        let rows: Vec<Row> = response.take::<Vec<Row>>(0).unwrap_or_default();

        Ok(rows
            .into_iter()
            .map(|r| TextChunkSearchResult {
                chunk: TextChunk {
                    id: r.id,
                    created_at: r.created_at,
                    updated_at: r.updated_at,
                    document_id: r.document_id,
                    workspace_id: r.workspace_id,
                    ordinal: r.ordinal,
                    content: r.content,
                    metadata: r.metadata,
                    embedding: r.embedding,
                    dimension: r.dimension,
                },
                score: r.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    fn make_chunk(document_id: &str, workspace_id: &str, ordinal: u32, embedding: Vec<f32>) -> TextChunk {
        TextChunk::new(
            document_id.to_string(),
            workspace_id.to_string(),
            ordinal,
            format!("chunk {ordinal} of {document_id}"),
            serde_json::json!({ "unit": 0 }),
            embedding,
        )
    }

    #[tokio::test]
    async fn insert_all_and_count() {
        let db = memory_db().await;

        let chunks = vec![
            make_chunk("doc1", "ws1", 0, vec![1.0, 0.0, 0.0]),
            make_chunk("doc1", "ws1", 1, vec![0.0, 1.0, 0.0]),
        ];
        TextChunk::insert_all(chunks, &db).await.expect("insert");

        assert_eq!(TextChunk::count_by_document("doc1", &db).await.expect("count"), 2);
        assert_eq!(TextChunk::count_by_document("doc2", &db).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn delete_by_document_leaves_other_documents() {
        let db = memory_db().await;

        TextChunk::insert_all(
            vec![
                make_chunk("doc1", "ws1", 0, vec![1.0, 0.0, 0.0]),
                make_chunk("doc2", "ws1", 0, vec![0.0, 1.0, 0.0]),
            ],
            &db,
        )
        .await
        .expect("insert");

        TextChunk::delete_by_document("doc1", &db).await.expect("delete");

        assert_eq!(TextChunk::count_by_document("doc1", &db).await.expect("count"), 0);
        assert_eq!(TextChunk::count_by_document("doc2", &db).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn vector_search_orders_by_similarity() {
        let db = memory_db().await;

        TextChunk::insert_all(
            vec![
                make_chunk("doc1", "ws1", 0, vec![1.0, 0.0, 0.0]),
                make_chunk("doc1", "ws1", 1, vec![0.0, 1.0, 0.0]),
            ],
            &db,
        )
        .await
        .expect("insert");

        let results = TextChunk::vector_search("ws1", vec![0.0, 1.0, 0.0], 3, 5, &db)
            .await
            .expect("search");

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.ordinal, 1);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn vector_search_is_workspace_scoped() {
        let db = memory_db().await;

        TextChunk::insert_all(
            vec![
                make_chunk("doc1", "ws1", 0, vec![1.0, 0.0, 0.0]),
                make_chunk("doc2", "ws2", 0, vec![1.0, 0.0, 0.0]),
            ],
            &db,
        )
        .await
        .expect("insert");

        let results = TextChunk::vector_search("ws1", vec![1.0, 0.0, 0.0], 3, 5, &db)
            .await
            .expect("search");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.workspace_id, "ws1");
    }

    #[tokio::test]
    async fn vector_search_filters_by_dimension() {
        let db = memory_db().await;

        TextChunk::insert_all(
            vec![
                make_chunk("doc1", "ws1", 0, vec![1.0, 0.0, 0.0]),
                make_chunk("doc2", "ws1", 0, vec![1.0, 0.0, 0.0, 0.0]),
            ],
            &db,
        )
        .await
        .expect("insert");

        let results = TextChunk::vector_search("ws1", vec![1.0, 0.0, 0.0], 3, 5, &db)
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.dimension, 3);

        let results = TextChunk::vector_search("ws1", vec![1.0, 0.0, 0.0, 0.0], 4, 5, &db)
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.document_id, "doc2");
    }

    #[tokio::test]
    async fn vector_search_breaks_ties_by_document_and_ordinal() {
        let db = memory_db().await;

        // Identical embeddings, so ordering falls back to (document_id, ordinal)
        TextChunk::insert_all(
            vec![
                make_chunk("doc-b", "ws1", 1, vec![1.0, 0.0]),
                make_chunk("doc-b", "ws1", 0, vec![1.0, 0.0]),
                make_chunk("doc-a", "ws1", 0, vec![1.0, 0.0]),
            ],
            &db,
        )
        .await
        .expect("insert");

        let results = TextChunk::vector_search("ws1", vec![1.0, 0.0], 2, 5, &db)
            .await
            .expect("search");

        let order: Vec<(String, u32)> = results
            .iter()
            .map(|r| (r.chunk.document_id.clone(), r.chunk.ordinal))
            .collect();
        assert_eq!(
            order,
            vec![
                ("doc-a".to_string(), 0),
                ("doc-b".to_string(), 0),
                ("doc-b".to_string(), 1),
            ]
        );
    }
}
