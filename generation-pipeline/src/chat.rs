use common::{
    error::AppError,
    settings::SettingsHandle,
    storage::{
        db::SurrealDbClient,
        types::{
            chat_message::{format_history, ChatMessage, MessageRole},
            workspace::Workspace,
        },
    },
};
use retrieval_pipeline::{chunks_to_context, retrieve, CHAT_RETRIEVAL_K};
use serde_json::Value;

/// Messages of prior conversation included in each prompt.
pub const MEMORY_WINDOW: usize = 10;

const CHAT_SYSTEM_PROMPT: &str = "You are a study assistant. Answer the user's question using ONLY \
the information in the provided context block. Do not use outside knowledge. If the context does \
not support an answer, reply exactly: \"I don't find that in the provided materials.\" Be concise \
and cite facts from the context rather than speculating.";

/// Conversational QA over a workspace's documents.
///
/// The user turn is appended before retrieval so history survives even when
/// retrieval refuses (mixed fingerprints); the user sees their message and
/// the error, and can retry after remediation.
pub async fn chat(
    db: &SurrealDbClient,
    settings: &SettingsHandle,
    workspace_id: &str,
    message: &str,
) -> Result<String, AppError> {
    if message.trim().is_empty() {
        return Err(AppError::Validation("Message may not be empty".into()));
    }

    let workspace = Workspace::get_required(workspace_id, db).await?;
    let effective = settings.effective(Some(&workspace)).await;

    let user_message = ChatMessage::new(
        workspace_id.to_string(),
        MessageRole::User,
        message.to_string(),
    );
    db.store_item(user_message.clone()).await?;

    let context = retrieve(db, &effective, workspace_id, message, CHAT_RETRIEVAL_K).await?;

    // Memory window: the last N turns before the one just appended
    let history = ChatMessage::history(workspace_id, db).await?;
    let memory: Vec<ChatMessage> = history
        .into_iter()
        .filter(|m| m.id != user_message.id)
        .collect();
    let window_start = memory.len().saturating_sub(MEMORY_WINDOW);
    let memory = memory.get(window_start..).unwrap_or_default();

    let prompt = build_user_prompt(&chunks_to_context(&context), memory, message);

    let llm = effective.build_llm()?;
    let answer = llm.complete(CHAT_SYSTEM_PROMPT, &prompt, None).await?;

    db.store_item(ChatMessage::new(
        workspace_id.to_string(),
        MessageRole::Assistant,
        answer.clone(),
    ))
    .await?;

    Ok(answer)
}

fn build_user_prompt(context_json: &Value, memory: &[ChatMessage], query: &str) -> String {
    format!(
        r"
        Chat history:
        ==================
        {}

        Context Information:
        ==================
        {}

        User Question:
        ==================
        {}
        ",
        format_history(memory),
        context_json,
        query
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::system_settings::SystemSettingsUpdate;
    use common::utils::config::AppConfig;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn fixture() -> (Arc<SurrealDbClient>, SettingsHandle, Workspace) {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        db.apply_migrations().await.expect("migrations");

        let settings = SettingsHandle::initialize(Arc::clone(&db), &AppConfig::default())
            .await
            .expect("settings");
        settings
            .update(SystemSettingsUpdate {
                embedding_provider: Some("hashed".into()),
                embedding_model: Some("hashed-32".into()),
                ..Default::default()
            })
            .await
            .expect("update");

        let workspace = Workspace::new("Chat ws".into());
        db.store_item(workspace.clone()).await.expect("store workspace");

        (db, settings, workspace)
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_any_write() {
        let (db, settings, workspace) = fixture().await;

        let result = chat(&db, &settings, &workspace.id, "   ").await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let history = ChatMessage::history(&workspace.id, &db).await.expect("history");
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn empty_workspace_refuses_but_keeps_user_turn() {
        let (db, settings, workspace) = fixture().await;

        let result = chat(&db, &settings, &workspace.id, "What is osmosis?").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        // The user's turn is in history so the conversation is replayable
        let history = ChatMessage::history(&workspace.id, &db).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn missing_workspace_is_not_found() {
        let (db, settings, _) = fixture().await;
        let result = chat(&db, &settings, "missing-ws", "hello").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn prompt_contains_history_context_and_question() {
        let memory = vec![
            ChatMessage::new("ws".into(), MessageRole::User, "What is ATP?".into()),
            ChatMessage::new(
                "ws".into(),
                MessageRole::Assistant,
                "Adenosine triphosphate.".into(),
            ),
        ];
        let context = serde_json::json!([{"content": "ATP is the energy currency."}]);

        let prompt = build_user_prompt(&context, &memory, "Where is it produced?");
        assert!(prompt.contains("User: What is ATP?"));
        assert!(prompt.contains("Assistant: Adenosine triphosphate."));
        assert!(prompt.contains("ATP is the energy currency."));
        assert!(prompt.contains("Where is it produced?"));
    }

    #[test]
    fn memory_window_math() {
        // Windowing logic mirrored from chat(): last N of the prior turns
        let messages: Vec<ChatMessage> = (0..25)
            .map(|i| ChatMessage::new("ws".into(), MessageRole::User, format!("m{i}")))
            .collect();
        let start = messages.len().saturating_sub(MEMORY_WINDOW);
        let window = &messages[start..];
        assert_eq!(window.len(), MEMORY_WINDOW);
        assert_eq!(window[0].content, "m15");
        assert_eq!(window[9].content, "m24");
    }
}
