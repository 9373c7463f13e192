use std::sync::Arc;

use common::{
    error::AppError,
    providers::tts::voice_info,
    settings::SettingsHandle,
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::{
            artifact::Artifact,
            podcast_version::{PodcastType, PodcastVersion, SynthesisStatus},
        },
    },
};
use tracing::{error, info, warn};

use crate::{generators::generate_podcast_script, schemas::PodcastScriptPayload};

/// Generates a script and registers a new podcast version for it, evicting
/// the oldest version past the cap. Synthesis itself runs afterwards (spawned
/// by the caller) and streams progress through the version row.
pub async fn create_podcast_version(
    db: &SurrealDbClient,
    settings: &SettingsHandle,
    workspace_id: &str,
    topic: &str,
    podcast_type: PodcastType,
    voice_a: &str,
    voice_b: Option<&str>,
    storage: &StorageManager,
) -> Result<PodcastVersion, AppError> {
    let voice_a_info =
        voice_info(voice_a).ok_or_else(|| AppError::Validation(format!("Unknown voice '{voice_a}'")))?;
    let voice_b_info = match voice_b {
        Some(id) => Some(
            voice_info(id).ok_or_else(|| AppError::Validation(format!("Unknown voice '{id}'")))?,
        ),
        None => None,
    };
    if podcast_type == PodcastType::Duo && voice_b_info.is_none() {
        return Err(AppError::Validation(
            "Duo podcasts require both voice_a and voice_b".into(),
        ));
    }

    let script = generate_podcast_script(
        db,
        settings,
        workspace_id,
        topic,
        podcast_type,
        voice_a,
        voice_b,
    )
    .await?;

    let version = PodcastVersion::new(
        workspace_id.to_string(),
        topic.to_string(),
        podcast_type,
        voice_a.to_string(),
        voice_b.map(str::to_string),
        voice_a_info.name.to_string(),
        voice_b_info.map(|info| info.name.to_string()),
        script.id.clone(),
    );
    let version = db
        .store_item(version)
        .await?
        .ok_or_else(|| AppError::InternalError("Podcast version insert returned nothing".into()))?;

    PodcastVersion::enforce_version_cap(workspace_id, topic, podcast_type, db, storage).await?;

    Ok(version)
}

/// Looks up the newest version for the key and re-voices it in place: same
/// row, same version cap, replaced audio.
pub async fn prepare_resynthesis(
    db: &SurrealDbClient,
    workspace_id: &str,
    topic: &str,
    podcast_type: PodcastType,
    voice_a: &str,
    voice_b: Option<&str>,
) -> Result<PodcastVersion, AppError> {
    let versions = PodcastVersion::list_versions(workspace_id, topic, podcast_type, db).await?;
    let Some(version) = versions.into_iter().next() else {
        return Err(AppError::NotFound(format!(
            "No {podcast_type} podcast version exists for this topic"
        )));
    };

    let voice_a_info =
        voice_info(voice_a).ok_or_else(|| AppError::Validation(format!("Unknown voice '{voice_a}'")))?;
    let voice_b_name = match voice_b {
        Some(id) => Some(
            voice_info(id)
                .ok_or_else(|| AppError::Validation(format!("Unknown voice '{id}'")))?
                .name
                .to_string(),
        ),
        None => None,
    };

    db.query(
        "UPDATE type::thing('podcast_version', $id) SET \
            voice_a = $voice_a, voice_b = $voice_b, \
            voice_a_name = $voice_a_name, voice_b_name = $voice_b_name, \
            status = 'pending', progress = 0, message = '', updated_at = time::now()",
    )
    .bind(("id", version.id.clone()))
    .bind(("voice_a", voice_a.to_string()))
    .bind(("voice_b", voice_b.map(str::to_string)))
    .bind(("voice_a_name", voice_a_info.name.to_string()))
    .bind(("voice_b_name", voice_b_name))
    .await?
    .check()?;

    PodcastVersion::get_required(&version.id, db).await
}

/// Runs synthesis to a terminal state, absorbing errors into the version row.
/// Callers spawn this so the HTTP request returns the stub immediately.
pub async fn run_synthesis(
    db: Arc<SurrealDbClient>,
    storage: StorageManager,
    settings: SettingsHandle,
    version_id: String,
) {
    if let Err(err) = synthesize_version(&db, &storage, &settings, &version_id).await {
        error!(version_id, error = %err, "Podcast synthesis failed");
        let reason = err.to_string();
        if let Err(update_err) =
            PodcastVersion::update_progress(&version_id, SynthesisStatus::Failed, 0, &reason, &db)
                .await
        {
            warn!(version_id, error = %update_err, "Failed to record synthesis failure");
        }
    }
}

/// Voices each script turn in order and writes the concatenated audio.
/// MP3 segment bytes are concatenated without re-encoding; players handle
/// back-to-back MPEG frames.
async fn synthesize_version(
    db: &SurrealDbClient,
    storage: &StorageManager,
    settings: &SettingsHandle,
    version_id: &str,
) -> Result<(), AppError> {
    let version = PodcastVersion::get_required(version_id, db).await?;

    let script_artifact: Artifact = db
        .get_item(&version.script_artifact_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Podcast script artifact not found".into()))?;
    let script: PodcastScriptPayload = serde_json::from_value(script_artifact.payload)
        .map_err(|err| AppError::InternalError(format!("Stored script is malformed: {err}")))?;

    let effective = settings.effective(None).await;
    let tts = effective.build_tts()?;

    let total = script.script.len();
    if total == 0 {
        return Err(AppError::InternalError("Stored script has no turns".into()));
    }
    let mut buffer: Vec<u8> = Vec::new();

    for (i, turn) in script.script.iter().enumerate() {
        let progress = ((i as f64 / total as f64) * 100.0).floor() as u8;
        PodcastVersion::update_progress(
            version_id,
            SynthesisStatus::Synthesizing,
            progress,
            &format!("Turn {}/{}", i + 1, total),
            db,
        )
        .await?;

        let audio = tts.synthesize(&turn.text, &turn.voice).await?;
        buffer.extend_from_slice(&audio);
    }

    let location = StorageManager::audio_location(&format!("{version_id}.mp3"));
    storage.put(&location, bytes::Bytes::from(buffer)).await?;
    PodcastVersion::set_audio_path(version_id, &location, db).await?;

    PodcastVersion::update_progress(version_id, SynthesisStatus::Complete, 100, "complete", db)
        .await?;
    info!(version_id, turns = total, "Podcast synthesis complete");

    Ok(())
}

/// Startup sweep: deletes audio objects no version row references. Eviction
/// deletes rows before files, so a crash can only leave orphaned files; this
/// reconciles them on the next boot.
pub async fn sweep_orphaned_audio(
    db: &SurrealDbClient,
    storage: &StorageManager,
) -> Result<usize, AppError> {
    let referenced = PodcastVersion::referenced_audio_paths(db).await?;
    let stored = storage
        .list(Some(common::storage::store::AUDIO_PREFIX))
        .await?;

    let mut removed = 0;
    for location in stored {
        if !referenced.contains(&location) {
            storage.delete(&location).await?;
            removed += 1;
        }
    }

    if removed > 0 {
        info!(removed, "Swept orphaned audio files");
    }
    Ok(removed)
}
