use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{DiaryEntry, EntryEmotion};

/// Create a diary entry together with its emotion tags
pub async fn create_entry(
    pool: &PgPool,
    profile_id: Uuid,
    entry_date: NaiveDate,
    title: Option<&str>,
    content: &str,
    emotions: &[(String, i16)],
) -> Result<DiaryEntry> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let entry = sqlx::query_as::<_, DiaryEntry>(
        r#"
        INSERT INTO diary_entries (profile_id, entry_date, title, content)
        VALUES ($1, $2, $3, $4)
        RETURNING id, profile_id, entry_date, title, content, created_at, updated_at
        "#,
    )
    .bind(profile_id)
    .bind(entry_date)
    .bind(title)
    .bind(content)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to create diary entry")?;

    for (emotion, intensity) in emotions {
        sqlx::query("INSERT INTO entry_emotions (entry_id, emotion, intensity) VALUES ($1, $2, $3)")
            .bind(entry.id)
            .bind(emotion)
            .bind(intensity)
            .execute(&mut *tx)
            .await
            .context("Failed to tag diary entry")?;
    }

    tx.commit().await.context("Failed to commit diary entry")?;

    Ok(entry)
}

/// List a profile's entries, newest first, optionally bounded by date
pub async fn list_entries(
    pool: &PgPool,
    profile_id: Uuid,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<DiaryEntry>> {
    let entries = sqlx::query_as::<_, DiaryEntry>(
        r#"
        SELECT id, profile_id, entry_date, title, content, created_at, updated_at
        FROM diary_entries
        WHERE profile_id = $1
          AND ($2::date IS NULL OR entry_date >= $2)
          AND ($3::date IS NULL OR entry_date <= $3)
        ORDER BY entry_date DESC, created_at DESC
        "#,
    )
    .bind(profile_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
    .context("Failed to list diary entries")?;

    Ok(entries)
}

/// Find one of the profile's entries by id
pub async fn find_entry(
    pool: &PgPool,
    profile_id: Uuid,
    entry_id: Uuid,
) -> Result<Option<DiaryEntry>> {
    let entry = sqlx::query_as::<_, DiaryEntry>(
        r#"
        SELECT id, profile_id, entry_date, title, content, created_at, updated_at
        FROM diary_entries
        WHERE id = $1 AND profile_id = $2
        "#,
    )
    .bind(entry_id)
    .bind(profile_id)
    .fetch_optional(pool)
    .await
    .context("Failed to find diary entry")?;

    Ok(entry)
}

/// Update an entry and replace its emotion tags wholesale
///
/// Returns None when the entry does not exist or belongs to another profile.
pub async fn update_entry(
    pool: &PgPool,
    profile_id: Uuid,
    entry_id: Uuid,
    entry_date: NaiveDate,
    title: Option<&str>,
    content: &str,
    emotions: &[(String, i16)],
) -> Result<Option<DiaryEntry>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let entry = sqlx::query_as::<_, DiaryEntry>(
        r#"
        UPDATE diary_entries
        SET entry_date = $3, title = $4, content = $5, updated_at = NOW()
        WHERE id = $1 AND profile_id = $2
        RETURNING id, profile_id, entry_date, title, content, created_at, updated_at
        "#,
    )
    .bind(entry_id)
    .bind(profile_id)
    .bind(entry_date)
    .bind(title)
    .bind(content)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to update diary entry")?;

    let Some(entry) = entry else {
        return Ok(None);
    };

    sqlx::query("DELETE FROM entry_emotions WHERE entry_id = $1")
        .bind(entry.id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear entry emotions")?;

    for (emotion, intensity) in emotions {
        sqlx::query("INSERT INTO entry_emotions (entry_id, emotion, intensity) VALUES ($1, $2, $3)")
            .bind(entry.id)
            .bind(emotion)
            .bind(intensity)
            .execute(&mut *tx)
            .await
            .context("Failed to tag diary entry")?;
    }

    tx.commit().await.context("Failed to commit entry update")?;

    Ok(Some(entry))
}

/// Delete one of the profile's entries; tags go with it via ON DELETE CASCADE
pub async fn delete_entry(pool: &PgPool, profile_id: Uuid, entry_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM diary_entries WHERE id = $1 AND profile_id = $2")
        .bind(entry_id)
        .bind(profile_id)
        .execute(pool)
        .await
        .context("Failed to delete diary entry")?;

    Ok(result.rows_affected() > 0)
}

/// Emotion tags for a single entry
pub async fn emotions_for_entry(pool: &PgPool, entry_id: Uuid) -> Result<Vec<EntryEmotion>> {
    let emotions = sqlx::query_as::<_, EntryEmotion>(
        r#"
        SELECT id, entry_id, emotion, intensity
        FROM entry_emotions
        WHERE entry_id = $1
        ORDER BY emotion
        "#,
    )
    .bind(entry_id)
    .fetch_all(pool)
    .await
    .context("Failed to load entry emotions")?;

    Ok(emotions)
}
