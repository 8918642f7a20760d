use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Local profile record for a provider-authenticated user
///
/// The primary key is the stable user id issued by the identity provider.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A dated diary entry owned by a profile
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DiaryEntry {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub entry_date: NaiveDate,
    pub title: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Emotion label attached to a diary entry
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EntryEmotion {
    pub id: Uuid,
    pub entry_id: Uuid,
    pub emotion: String,
    /// Subjective intensity on a 1..=5 scale
    pub intensity: i16,
}
