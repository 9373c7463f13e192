use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

stored_object!(ChatMessage, "chat_message", {
    workspace_id: String,
    role: MessageRole,
    content: String
});

impl ChatMessage {
    pub fn new(workspace_id: String, role: MessageRole, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            workspace_id,
            role,
            content,
        }
    }

    /// Full history for a workspace, oldest first.
    pub async fn history(workspace_id: &str, db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let messages: Vec<Self> = db
            .query(
                "SELECT * FROM type::table($table) WHERE workspace_id = $workspace_id ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_string()))
            .await?
            .take(0)?;
        Ok(messages)
    }

    pub async fn clear_workspace(workspace_id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.query("DELETE type::table($table) WHERE workspace_id = $workspace_id")
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "User"),
            MessageRole::Assistant => write!(f, "Assistant"),
        }
    }
}

impl std::fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}

// helper function to format a window of messages for prompt assembly
pub fn format_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|msg| format!("{msg}"))
        .collect::<Vec<String>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn memory_db() -> SurrealDbClient {
        SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    #[tokio::test]
    async fn history_is_oldest_first_and_scoped() {
        let db = memory_db().await;

        let mut first = ChatMessage::new("ws1".into(), MessageRole::User, "first".into());
        let mut second = ChatMessage::new("ws1".into(), MessageRole::Assistant, "second".into());
        second.created_at = first.created_at + Duration::seconds(1);
        second.updated_at = second.created_at;
        let other = ChatMessage::new("ws2".into(), MessageRole::User, "elsewhere".into());

        db.store_item(second.clone()).await.expect("store second");
        db.store_item(first.clone()).await.expect("store first");
        db.store_item(other).await.expect("store other");

        let history = ChatMessage::history("ws1", &db).await.expect("history");
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);

        // created_at is non-decreasing through the history
        assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn clear_workspace_removes_only_that_workspace() {
        let db = memory_db().await;
        db.store_item(ChatMessage::new("ws1".into(), MessageRole::User, "a".into()))
            .await
            .expect("store");
        db.store_item(ChatMessage::new("ws2".into(), MessageRole::User, "b".into()))
            .await
            .expect("store");

        ChatMessage::clear_workspace("ws1", &db).await.expect("clear");

        assert!(ChatMessage::history("ws1", &db).await.expect("history").is_empty());
        assert_eq!(ChatMessage::history("ws2", &db).await.expect("history").len(), 1);
    }

    #[test]
    fn format_history_renders_roles() {
        let messages = vec![
            ChatMessage::new("ws".into(), MessageRole::User, "Hello".into()),
            ChatMessage::new("ws".into(), MessageRole::Assistant, "Hi there!".into()),
        ];

        assert_eq!(format_history(&messages), "User: Hello\nAssistant: Hi there!");
    }
}
