use std::sync::Arc;

use common::{
    error::AppError,
    providers::vision::VisionProvider,
    settings::SettingsHandle,
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::{
            document::{Document, DocumentStatus, FileType},
            ingestion_task::{IngestionTask, TaskStatus},
            text_chunk::TextChunk,
            workspace::Workspace,
        },
    },
    utils::config::AppConfig,
};
use tracing::{info, warn};

use crate::{
    chunker::chunk_text,
    extract::{extract, ExtractedItem},
};

/// Drives one document through extract → caption → chunk → embed → persist.
/// All phases run under the fingerprint resolved when the task starts, so a
/// settings change mid-flight never mixes models within a document.
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    settings: SettingsHandle,
    storage: StorageManager,
    config: AppConfig,
}

/// Internal control flow: a task either finishes a phase, or stops because
/// cancellation was observed at a phase boundary.
enum PhaseOutcome<T> {
    Continue(T),
    Cancelled,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        settings: SettingsHandle,
        storage: StorageManager,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            settings,
            storage,
            config,
        }
    }

    /// Processes a claimed task to a terminal state. Errors are absorbed into
    /// the document/task rows; the returned error is for worker logging only.
    pub async fn process_task(&self, task: IngestionTask) -> Result<(), AppError> {
        Document::set_status(&task.document_id, DocumentStatus::Processing, &self.db).await?;

        match self.run_phases(&task).await {
            Ok(PhaseOutcome::Continue(chunk_count)) => {
                IngestionTask::update_progress(&task.id, TaskStatus::Completed, 100, "completed", &self.db)
                    .await?;
                info!(
                    document_id = %task.document_id,
                    chunks = chunk_count,
                    "Document ingestion completed"
                );
                Ok(())
            }
            Ok(PhaseOutcome::Cancelled) => {
                self.cleanup_cancelled(&task).await?;
                Ok(())
            }
            Err(err) => {
                let reason = short_reason(&err);
                Document::set_failed(&task.document_id, &reason, &self.db).await?;
                IngestionTask::update_progress(&task.id, TaskStatus::Failed, 0, &reason, &self.db)
                    .await?;
                Err(err)
            }
        }
    }

    async fn run_phases(&self, task: &IngestionTask) -> Result<PhaseOutcome<usize>, AppError> {
        let document = Document::get_required(&task.document_id, &self.db).await?;
        let workspace = Workspace::get_required(&task.workspace_id, &self.db).await?;

        // The effective config is resolved once; every phase uses this snapshot.
        let effective = self.settings.effective(Some(&workspace)).await;

        if document.file_type == FileType::Image && !effective.enable_vision {
            return Err(AppError::Processing("vision processing is disabled".into()));
        }

        // Phase 1: extract
        self.progress(task, 10, "extracting content").await?;
        let file_bytes = self.storage.get(&document.file_path).await?;
        let mime_type = mime_guess::from_path(&document.file_path)
            .first_or_octet_stream()
            .to_string();
        let items = extract(
            document.file_type,
            &file_bytes,
            &mime_type,
            effective.enable_vision,
        )?;

        if self.cancelled(task).await? {
            return Ok(PhaseOutcome::Cancelled);
        }

        // Phase 2: caption images (vision-gated)
        self.progress(task, 30, "captioning images").await?;
        let vision = effective.build_vision()?;
        let items = self.caption_items(items, vision.as_ref()).await;

        if self.cancelled(task).await? {
            return Ok(PhaseOutcome::Cancelled);
        }

        // Phase 3: chunk per source unit
        self.progress(task, 50, "chunking text").await?;
        let chunks = self.build_chunks(&document, &items)?;
        if chunks.is_empty() {
            return Err(AppError::Processing(
                "document produced no extractable text".into(),
            ));
        }

        if self.cancelled(task).await? {
            return Ok(PhaseOutcome::Cancelled);
        }

        // Phase 4: embed under the task's fingerprint
        self.progress(task, 70, "embedding chunks").await?;
        let embedder = effective.build_embedder().await?;
        let texts: Vec<String> = chunks.iter().map(|(_, _, text)| text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        if self.cancelled(task).await? {
            return Ok(PhaseOutcome::Cancelled);
        }

        // Phase 5: persist atomically (delete-then-insert keeps reprocess idempotent)
        self.progress(task, 90, "persisting chunks").await?;
        let records: Vec<TextChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|((ordinal, unit, text), embedding)| {
                TextChunk::new(
                    document.id.clone(),
                    document.workspace_id.clone(),
                    ordinal,
                    text,
                    serde_json::json!({ "unit": unit }),
                    embedding,
                )
            })
            .collect();
        let chunk_count = records.len();

        TextChunk::delete_by_document(&document.id, &self.db).await?;
        TextChunk::insert_all(records, &self.db).await?;

        let (provider, model) = embedder.fingerprint();
        Document::complete_with_fingerprint(&document.id, &provider, &model, &self.db).await?;

        Ok(PhaseOutcome::Continue(chunk_count))
    }

    /// Replaces image items with caption text. A single failed caption
    /// degrades to the placeholder inside the adapter; an absent vision
    /// provider drops image items entirely.
    async fn caption_items(
        &self,
        items: Vec<ExtractedItem>,
        vision: Option<&VisionProvider>,
    ) -> Vec<ExtractedItem> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ExtractedItem::Text { .. } => out.push(item),
                ExtractedItem::Image { unit, bytes, mime } => {
                    let Some(vision) = vision else {
                        continue;
                    };
                    let caption = vision.caption(&bytes, &mime).await;
                    out.push(ExtractedItem::Text { unit, text: caption });
                }
            }
        }
        out
    }

    /// Concatenates text per source unit (page/slide), then chunks each unit
    /// with the configured capacity/overlap. Ordinals are monotonic across
    /// the whole document.
    fn build_chunks(
        &self,
        document: &Document,
        items: &[ExtractedItem],
    ) -> Result<Vec<(u32, u32, String)>, AppError> {
        let mut units: Vec<(u32, String)> = Vec::new();
        for item in items {
            if let ExtractedItem::Text { unit, text } = item {
                match units.iter_mut().find(|(u, _)| u == unit) {
                    Some((_, existing)) => {
                        existing.push_str("\n\n");
                        existing.push_str(text);
                    }
                    None => units.push((*unit, text.clone())),
                }
            }
        }
        units.sort_by_key(|(unit, _)| *unit);

        let mut chunks = Vec::new();
        let mut ordinal: u32 = 0;
        for (unit, text) in units {
            for chunk in chunk_text(&text, self.config.chunk_capacity, self.config.chunk_overlap)? {
                chunks.push((ordinal, unit, chunk));
                ordinal = ordinal.saturating_add(1);
            }
        }

        if chunks.is_empty() {
            warn!(document_id = %document.id, "No chunks produced from extracted content");
        }

        Ok(chunks)
    }

    async fn cleanup_cancelled(&self, task: &IngestionTask) -> Result<(), AppError> {
        TextChunk::delete_by_document(&task.document_id, &self.db).await?;
        Document::set_failed(&task.document_id, "cancelled", &self.db).await?;
        IngestionTask::update_progress(&task.id, TaskStatus::Failed, 0, "cancelled", &self.db)
            .await?;
        info!(document_id = %task.document_id, "Ingestion task cancelled");
        Ok(())
    }

    async fn cancelled(&self, task: &IngestionTask) -> Result<bool, AppError> {
        IngestionTask::is_cancel_requested(&task.id, &self.db).await
    }

    async fn progress(&self, task: &IngestionTask, progress: u8, message: &str) -> Result<(), AppError> {
        IngestionTask::update_progress(&task.id, TaskStatus::Processing, progress, message, &self.db)
            .await
    }
}

/// Trims internal error chatter down to a user-readable reason.
fn short_reason(err: &AppError) -> String {
    let full = err.to_string();
    match full.split_once(": ") {
        Some((_, rest)) if !rest.is_empty() => rest.to_string(),
        _ => full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::system_settings::SystemSettingsUpdate;
    use common::utils::config::StorageKind;
    use object_store::memory::InMemory;
    use uuid::Uuid;

    async fn test_fixture() -> (IngestionPipeline, Arc<SurrealDbClient>, StorageManager, Workspace) {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        db.apply_migrations().await.expect("migrations");

        let config = AppConfig::default();
        let settings = SettingsHandle::initialize(Arc::clone(&db), &config)
            .await
            .expect("settings");
        // Deterministic embeddings keep the suite offline
        settings
            .update(SystemSettingsUpdate {
                embedding_provider: Some("hashed".into()),
                embedding_model: Some("hashed-32".into()),
                ..Default::default()
            })
            .await
            .expect("switch to hashed embeddings");

        let storage =
            StorageManager::with_backend(Arc::new(InMemory::new()), StorageKind::Memory);

        let workspace = Workspace::new("Test workspace".into());
        db.store_item(workspace.clone()).await.expect("store workspace");

        let pipeline = IngestionPipeline::new(Arc::clone(&db), settings, storage.clone(), config);
        (pipeline, db, storage, workspace)
    }

    fn sample_docx() -> Vec<u8> {
        use std::io::{Cursor, Write};
        use zip::write::SimpleFileOptions;

        let document = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>
<w:p><w:r><w:t>Photosynthesis converts light into chemical energy.</w:t></w:r></w:p>
<w:p><w:r><w:t>Chlorophyll absorbs red and blue wavelengths.</w:t></w:r></w:p>
</w:body>
</w:document>"#;

        let mut cursor = Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .expect("start file");
        writer.write_all(document.as_bytes()).expect("write");
        writer.finish().expect("finish");
        cursor.into_inner()
    }

    async fn upload_docx(
        db: &SurrealDbClient,
        storage: &StorageManager,
        workspace: &Workspace,
    ) -> Document {
        let location = StorageManager::upload_location(&workspace.id, "notes.docx");
        storage
            .put(&location, bytes::Bytes::from(sample_docx()))
            .await
            .expect("store upload");

        let document = Document::new(
            workspace.id.clone(),
            "notes.docx".into(),
            FileType::Docx,
            location,
        );
        db.store_item(document.clone()).await.expect("store document");
        document
    }

    #[tokio::test]
    async fn ingests_a_docx_document_end_to_end() {
        let (pipeline, db, storage, workspace) = test_fixture().await;
        let document = upload_docx(&db, &storage, &workspace).await;

        let task = IngestionTask::enqueue(&document.id, &workspace.id, &db)
            .await
            .expect("enqueue");
        pipeline.process_task(task.clone()).await.expect("process");

        let done = Document::get_required(&document.id, &db).await.expect("get");
        assert_eq!(done.status, DocumentStatus::Completed);
        assert_eq!(done.embedding_provider.as_deref(), Some("hashed"));
        assert_eq!(done.embedding_model.as_deref(), Some("hashed-32"));

        let count = TextChunk::count_by_document(&document.id, &db)
            .await
            .expect("count");
        assert!(count > 0);

        let finished_task = IngestionTask::latest_for_document(&document.id, &db)
            .await
            .expect("latest")
            .expect("present");
        assert_eq!(finished_task.status, TaskStatus::Completed);
        assert_eq!(finished_task.progress, 100);
    }

    #[tokio::test]
    async fn reprocessing_yields_identical_chunk_count() {
        let (pipeline, db, storage, workspace) = test_fixture().await;
        let document = upload_docx(&db, &storage, &workspace).await;

        let task = IngestionTask::enqueue(&document.id, &workspace.id, &db)
            .await
            .expect("enqueue");
        pipeline.process_task(task).await.expect("first run");
        let first_count = TextChunk::count_by_document(&document.id, &db)
            .await
            .expect("count");

        let retask = IngestionTask::enqueue(&document.id, &workspace.id, &db)
            .await
            .expect("re-enqueue");
        pipeline.process_task(retask).await.expect("second run");
        let second_count = TextChunk::count_by_document(&document.id, &db)
            .await
            .expect("count");

        assert_eq!(first_count, second_count);

        let done = Document::get_required(&document.id, &db).await.expect("get");
        assert_eq!(done.embedding_provider.as_deref(), Some("hashed"));
    }

    #[tokio::test]
    async fn cancellation_leaves_zero_chunks_and_failed_status() {
        let (pipeline, db, storage, workspace) = test_fixture().await;
        let document = upload_docx(&db, &storage, &workspace).await;

        let task = IngestionTask::enqueue(&document.id, &workspace.id, &db)
            .await
            .expect("enqueue");
        // Flag is set before the worker starts, observed at the first boundary
        IngestionTask::request_cancel(&task.id, &db).await.expect("cancel");

        pipeline.process_task(task.clone()).await.expect("process");

        let doc = Document::get_required(&document.id, &db).await.expect("get");
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.error_message.as_deref(), Some("cancelled"));

        let count = TextChunk::count_by_document(&document.id, &db)
            .await
            .expect("count");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn image_document_without_vision_fails_clearly() {
        let (pipeline, db, storage, workspace) = test_fixture().await;

        let location = StorageManager::upload_location(&workspace.id, "scan.png");
        storage
            .put(&location, bytes::Bytes::from_static(b"pngbytes"))
            .await
            .expect("store upload");
        let document = Document::new(
            workspace.id.clone(),
            "scan.png".into(),
            FileType::Image,
            location,
        );
        db.store_item(document.clone()).await.expect("store document");

        let task = IngestionTask::enqueue(&document.id, &workspace.id, &db)
            .await
            .expect("enqueue");
        let result = pipeline.process_task(task).await;
        assert!(result.is_err());

        let doc = Document::get_required(&document.id, &db).await.expect("get");
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.error_message.as_deref(), Some("vision processing is disabled"));
    }

    #[tokio::test]
    async fn unparseable_file_marks_document_failed() {
        let (pipeline, db, storage, workspace) = test_fixture().await;

        let location = StorageManager::upload_location(&workspace.id, "broken.docx");
        storage
            .put(&location, bytes::Bytes::from_static(b"not a zip"))
            .await
            .expect("store upload");
        let document = Document::new(
            workspace.id.clone(),
            "broken.docx".into(),
            FileType::Docx,
            location,
        );
        db.store_item(document.clone()).await.expect("store document");

        let task = IngestionTask::enqueue(&document.id, &workspace.id, &db)
            .await
            .expect("enqueue");
        let result = pipeline.process_task(task).await;
        assert!(result.is_err());

        let doc = Document::get_required(&document.id, &db).await.expect("get");
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert!(doc.error_message.is_some());
    }
}
