use common::{
    error::AppError,
    settings::SettingsHandle,
    storage::{
        db::SurrealDbClient,
        types::{
            artifact::{Artifact, ArtifactKind},
            podcast_version::PodcastType,
            workspace::Workspace,
        },
    },
};
use retrieval_pipeline::{chunks_to_context, retrieve, GENERATION_RETRIEVAL_K};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::info;

use crate::schemas::{
    flashcards_schema, lesson_schema, mindmap_schema, podcast_script_schema, quiz_schema,
    validate_flashcards, validate_lesson, validate_mindmap, validate_podcast_script, validate_quiz,
    FlashcardsPayload, LessonPayload, MindmapPayload, PodcastScriptPayload, QuizPayload,
};

const GENERATOR_SYSTEM_PROMPT: &str = "You are a study-material author. Build the requested \
artifact strictly from the provided context; do not invent facts the context does not support. \
Respond with JSON that conforms to the given schema.";

/// Shared generator template: retrieve context for the topic, ask the LLM for
/// a schema-conforming payload, validate it, and cache by
/// `(workspace, topic, kind)`. A cached artifact is returned as-is, which is
/// what makes repeated generation requests idempotent.
async fn generate<T, V>(
    db: &SurrealDbClient,
    settings: &SettingsHandle,
    workspace_id: &str,
    topic: &str,
    kind: ArtifactKind,
    schema: Value,
    validate: V,
    instruction: String,
) -> Result<Artifact, AppError>
where
    T: DeserializeOwned + Serialize,
    V: Fn(&T) -> Result<(), String>,
{
    if topic.trim().is_empty() {
        return Err(AppError::Validation("Topic may not be empty".into()));
    }

    if kind != ArtifactKind::PodcastScript {
        if let Some(cached) = Artifact::get_by_key(workspace_id, topic, kind, db).await? {
            info!(workspace_id, topic, kind = kind.as_str(), "Returning cached artifact");
            return Ok(cached);
        }
    }

    let workspace = Workspace::get_required(workspace_id, db).await?;
    let effective = settings.effective(Some(&workspace)).await;

    let context = retrieve(db, &effective, workspace_id, topic, GENERATION_RETRIEVAL_K).await?;
    let context_json = chunks_to_context(&context);

    let user_prompt = format!(
        r"
        Context Information:
        ==================
        {context_json}

        Task:
        ==================
        {instruction}
        "
    );

    let llm = effective.build_llm()?;
    let payload: T = llm
        .complete_structured(
            GENERATOR_SYSTEM_PROMPT,
            &user_prompt,
            kind.as_str(),
            schema,
            validate,
        )
        .await?;

    let artifact = Artifact::upsert(
        workspace_id,
        topic,
        kind,
        serde_json::to_value(&payload)
            .map_err(|err| AppError::InternalError(format!("Payload serialization failed: {err}")))?,
        db,
    )
    .await?;

    info!(workspace_id, topic, kind = kind.as_str(), "Artifact generated");
    Ok(artifact)
}

pub async fn generate_lesson(
    db: &SurrealDbClient,
    settings: &SettingsHandle,
    workspace_id: &str,
    topic: &str,
) -> Result<Artifact, AppError> {
    generate::<LessonPayload, _>(
        db,
        settings,
        workspace_id,
        topic,
        ArtifactKind::Lesson,
        lesson_schema(),
        validate_lesson,
        format!(
            "Write a structured lesson plan on \"{topic}\". Break it into sections with a title, \
             explanatory content, and 2-5 key points each."
        ),
    )
    .await
}

pub async fn generate_flashcards(
    db: &SurrealDbClient,
    settings: &SettingsHandle,
    workspace_id: &str,
    topic: &str,
) -> Result<Artifact, AppError> {
    generate::<FlashcardsPayload, _>(
        db,
        settings,
        workspace_id,
        topic,
        ArtifactKind::Flashcards,
        flashcards_schema(),
        validate_flashcards,
        format!(
            "Create 10 to 20 flashcards on \"{topic}\". Each card has a question or term on the \
             front and a concise answer on the back."
        ),
    )
    .await
}

pub async fn generate_quiz(
    db: &SurrealDbClient,
    settings: &SettingsHandle,
    workspace_id: &str,
    topic: &str,
) -> Result<Artifact, AppError> {
    generate::<QuizPayload, _>(
        db,
        settings,
        workspace_id,
        topic,
        ArtifactKind::Quiz,
        quiz_schema(),
        validate_quiz,
        format!(
            "Create a multiple-choice quiz on \"{topic}\" with at least 4 questions. Every \
             question must have exactly 4 options, the index of the correct one, and a short \
             explanation."
        ),
    )
    .await
}

pub async fn generate_mindmap(
    db: &SurrealDbClient,
    settings: &SettingsHandle,
    workspace_id: &str,
    topic: &str,
) -> Result<Artifact, AppError> {
    generate::<MindmapPayload, _>(
        db,
        settings,
        workspace_id,
        topic,
        ArtifactKind::Mindmap,
        mindmap_schema(),
        validate_mindmap,
        format!(
            "Build a concept map for \"{topic}\". Use node type 'input' for the central concept, \
             'default' for intermediate concepts and 'output' for leaf details. Edges must connect \
             existing node ids and the graph must not contain cycles."
        ),
    )
    .await
}

/// Podcast scripts append a fresh artifact each time (they are versioned via
/// `PodcastVersion`), so this bypasses the cache deliberately.
pub async fn generate_podcast_script(
    db: &SurrealDbClient,
    settings: &SettingsHandle,
    workspace_id: &str,
    topic: &str,
    podcast_type: PodcastType,
    voice_a: &str,
    voice_b: Option<&str>,
) -> Result<Artifact, AppError> {
    let duo = podcast_type == PodcastType::Duo;
    let allowed: Vec<String> = match voice_b {
        Some(b) if duo => vec![voice_a.to_string(), b.to_string()],
        _ => vec![voice_a.to_string()],
    };

    let instruction = if duo {
        let voice_b = voice_b.ok_or_else(|| {
            AppError::Validation("Duo podcasts require both voice_a and voice_b".into())
        })?;
        format!(
            "Write a two-host podcast dialogue on \"{topic}\". Speaker \"Host\" uses voice \
             \"{voice_a}\" and speaker \"Guest\" uses voice \"{voice_b}\". Alternate speakers, \
             keep turns short and conversational, and cover the key ideas from the context."
        )
    } else {
        format!(
            "Write a single-narrator podcast script on \"{topic}\". The speaker \"Narrator\" uses \
             voice \"{voice_a}\". Keep a clear narrative arc over the key ideas from the context."
        )
    };

    let allowed_refs: Vec<&str> = allowed.iter().map(String::as_str).collect();
    generate::<PodcastScriptPayload, _>(
        db,
        settings,
        workspace_id,
        topic,
        ArtifactKind::PodcastScript,
        podcast_script_schema(),
        move |payload: &PodcastScriptPayload| validate_podcast_script(payload, duo, &allowed_refs),
        instruction,
    )
    .await
}
