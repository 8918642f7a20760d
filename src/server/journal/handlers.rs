use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::instrument;
use uuid::Uuid;

use crate::db::{entries, models::Profile};
use crate::server::error::{ServerError, ServerErrorExt};
use crate::server::journal::models::{
    CreateEntryRequest, EmotionTag, EntryResponse, ListEntriesQuery, ListEntriesResponse,
    UpdateEntryRequest,
};
use crate::server::state::AppState;

/// Validate emotion tags before touching the database
fn validate_emotions(emotions: &[EmotionTag]) -> Result<Vec<(String, i16)>, ServerError> {
    let mut validated = Vec::with_capacity(emotions.len());

    for tag in emotions {
        let emotion = tag.emotion.trim();
        if emotion.is_empty() {
            return Err(ServerError::bad_request("Emotion label must not be empty"));
        }
        if !(1..=5).contains(&tag.intensity) {
            return Err(ServerError::bad_request(
                "Emotion intensity must be between 1 and 5",
            ));
        }
        validated.push((emotion.to_lowercase(), tag.intensity));
    }

    Ok(validated)
}

fn validate_content(content: &str) -> Result<(), ServerError> {
    if content.trim().is_empty() {
        return Err(ServerError::bad_request("Entry content must not be empty"));
    }
    Ok(())
}

/// List the authenticated profile's entries, optionally bounded by date
#[instrument(skip(state, profile, params))]
pub async fn list_entries(
    State(state): State<AppState>,
    Extension(profile): Extension<Profile>,
    Query(params): Query<ListEntriesQuery>,
) -> Result<Json<ListEntriesResponse>, ServerError> {
    let rows = entries::list_entries(&state.db_pool, profile.id, params.from, params.to)
        .await
        .internal_err("Failed to list entries")?;

    let mut result = Vec::with_capacity(rows.len());
    for entry in rows {
        let emotions = entries::emotions_for_entry(&state.db_pool, entry.id)
            .await
            .internal_err("Failed to load entry emotions")?;
        result.push(EntryResponse::from_entry(entry, emotions));
    }

    Ok(Json(ListEntriesResponse { entries: result }))
}

/// Create a new diary entry with its emotion tags
#[instrument(skip(state, profile, payload))]
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(profile): Extension<Profile>,
    Json(payload): Json<CreateEntryRequest>,
) -> Result<(StatusCode, Json<EntryResponse>), ServerError> {
    validate_content(&payload.content)?;
    let emotions = validate_emotions(&payload.emotions)?;

    let entry = entries::create_entry(
        &state.db_pool,
        profile.id,
        payload.entry_date,
        payload.title.as_deref(),
        &payload.content,
        &emotions,
    )
    .await
    .map_err(|e| {
        ServerError::internal_anyhow(e, "Failed to create entry")
            .with_context("profile_id", profile.id.to_string())
    })?;

    tracing::info!(
        entry_id = %entry.id,
        profile_id = %profile.id,
        "Created diary entry"
    );

    let emotions = entries::emotions_for_entry(&state.db_pool, entry.id)
        .await
        .internal_err("Failed to load entry emotions")?;

    Ok((
        StatusCode::CREATED,
        Json(EntryResponse::from_entry(entry, emotions)),
    ))
}

/// Fetch a single entry
#[instrument(skip(state, profile))]
pub async fn get_entry(
    State(state): State<AppState>,
    Extension(profile): Extension<Profile>,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<EntryResponse>, ServerError> {
    let entry = entries::find_entry(&state.db_pool, profile.id, entry_id)
        .await
        .internal_err("Failed to find entry")?
        .ok_or_else(|| ServerError::not_found("Entry not found"))?;

    let emotions = entries::emotions_for_entry(&state.db_pool, entry.id)
        .await
        .internal_err("Failed to load entry emotions")?;

    Ok(Json(EntryResponse::from_entry(entry, emotions)))
}

/// Update an entry and replace its emotion tags
#[instrument(skip(state, profile, payload))]
pub async fn update_entry(
    State(state): State<AppState>,
    Extension(profile): Extension<Profile>,
    Path(entry_id): Path<Uuid>,
    Json(payload): Json<UpdateEntryRequest>,
) -> Result<Json<EntryResponse>, ServerError> {
    validate_content(&payload.content)?;
    let emotions = validate_emotions(&payload.emotions)?;

    let entry = entries::update_entry(
        &state.db_pool,
        profile.id,
        entry_id,
        payload.entry_date,
        payload.title.as_deref(),
        &payload.content,
        &emotions,
    )
    .await
    .internal_err("Failed to update entry")?
    .ok_or_else(|| ServerError::not_found("Entry not found"))?;

    let emotions = entries::emotions_for_entry(&state.db_pool, entry.id)
        .await
        .internal_err("Failed to load entry emotions")?;

    Ok(Json(EntryResponse::from_entry(entry, emotions)))
}

/// Delete an entry (tags cascade)
#[instrument(skip(state, profile))]
pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(profile): Extension<Profile>,
    Path(entry_id): Path<Uuid>,
) -> Result<StatusCode, ServerError> {
    let deleted = entries::delete_entry(&state.db_pool, profile.id, entry_id)
        .await
        .internal_err("Failed to delete entry")?;

    if !deleted {
        return Err(ServerError::not_found("Entry not found"));
    }

    tracing::info!(
        entry_id = %entry_id,
        profile_id = %profile.id,
        "Deleted diary entry"
    );

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_emotions_normalizes_labels() {
        let tags = vec![EmotionTag {
            emotion: "  Joy ".to_string(),
            intensity: 4,
        }];
        let validated = validate_emotions(&tags).unwrap();
        assert_eq!(validated, vec![("joy".to_string(), 4)]);
    }

    #[test]
    fn test_validate_emotions_rejects_out_of_range_intensity() {
        for intensity in [0, 6, -1] {
            let tags = vec![EmotionTag {
                emotion: "joy".to_string(),
                intensity,
            }];
            assert!(validate_emotions(&tags).is_err());
        }
    }

    #[test]
    fn test_validate_emotions_rejects_empty_label() {
        let tags = vec![EmotionTag {
            emotion: "   ".to_string(),
            intensity: 3,
        }];
        assert!(validate_emotions(&tags).is_err());
    }

    #[test]
    fn test_validate_content() {
        assert!(validate_content("wrote in my journal").is_ok());
        assert!(validate_content("   ").is_err());
    }
}
