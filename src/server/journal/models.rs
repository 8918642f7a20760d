use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::{DiaryEntry, EntryEmotion};

/// Emotion label with subjective intensity, as sent and returned by the API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmotionTag {
    pub emotion: String,
    pub intensity: i16,
}

impl From<EntryEmotion> for EmotionTag {
    fn from(row: EntryEmotion) -> Self {
        Self {
            emotion: row.emotion,
            intensity: row.intensity,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub entry_date: NaiveDate,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub emotions: Vec<EmotionTag>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntryRequest {
    pub entry_date: NaiveDate,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub emotions: Vec<EmotionTag>,
}

#[derive(Debug, Deserialize)]
pub struct ListEntriesQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub id: Uuid,
    pub entry_date: NaiveDate,
    pub title: Option<String>,
    pub content: String,
    pub emotions: Vec<EmotionTag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntryResponse {
    pub fn from_entry(entry: DiaryEntry, emotions: Vec<EntryEmotion>) -> Self {
        Self {
            id: entry.id,
            entry_date: entry.entry_date,
            title: entry.title,
            content: entry.content,
            emotions: emotions.into_iter().map(EmotionTag::from).collect(),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListEntriesResponse {
    pub entries: Vec<EntryResponse>,
}
