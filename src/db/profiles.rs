use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::Profile;

/// Fields for a profile that does not exist yet
#[derive(Debug, Clone)]
pub struct NewProfile {
    /// Stable user id issued by the identity provider
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Lookup/create capability for local profiles, keyed by the provider's
/// stable user id
///
/// The login flow only needs existence checks and creation; the narrow trait
/// keeps the storage swappable (and testable without a database).
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>>;

    async fn exists_by_id(&self, id: Uuid) -> Result<bool>;

    /// Insert a new profile; a duplicate id or username is an error
    ///
    /// Concurrent duplicate logins race past the existence check by design -
    /// the unique constraint surfaces the loser as a retryable failure.
    async fn create(&self, profile: NewProfile) -> Result<Profile>;
}

/// PostgreSQL-backed profile store
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, username, display_name, avatar_url, created_at, updated_at
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find profile by id")?;

        Ok(profile)
    }

    async fn exists_by_id(&self, id: Uuid) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM profiles WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check profile existence")?;

        Ok(exists)
    }

    async fn create(&self, profile: NewProfile) -> Result<Profile> {
        let created = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, username, display_name, avatar_url)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, display_name, avatar_url, created_at, updated_at
            "#,
        )
        .bind(profile.id)
        .bind(&profile.username)
        .bind(&profile.display_name)
        .bind(&profile.avatar_url)
        .fetch_one(&self.pool)
        .await
        .context("Failed to create profile")?;

        tracing::info!(
            profile_id = %created.id,
            username = %created.username,
            "Created new profile"
        );

        Ok(created)
    }
}

/// In-memory profile store for tests and single-process development
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<Uuid, Profile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        Ok(self.profiles.read().await.get(&id).cloned())
    }

    async fn exists_by_id(&self, id: Uuid) -> Result<bool> {
        Ok(self.profiles.read().await.contains_key(&id))
    }

    async fn create(&self, profile: NewProfile) -> Result<Profile> {
        let mut profiles = self.profiles.write().await;

        if profiles.contains_key(&profile.id)
            || profiles.values().any(|p| p.username == profile.username)
        {
            bail!("duplicate key value violates unique constraint on profiles");
        }

        let now = Utc::now();
        let created = Profile {
            id: profile.id,
            username: profile.username,
            display_name: profile.display_name,
            avatar_url: profile.avatar_url,
            created_at: now,
            updated_at: now,
        };
        profiles.insert(created.id, created.clone());

        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_profile(id: Uuid, username: &str) -> NewProfile {
        NewProfile {
            id,
            username: username.to_string(),
            display_name: "Alice".to_string(),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = InMemoryProfileStore::new();
        let id = Uuid::new_v4();

        assert!(!store.exists_by_id(id).await.unwrap());

        let created = store.create(new_profile(id, "alice_12345678")).await.unwrap();
        assert_eq!(created.id, id);

        assert!(store.exists_by_id(id).await.unwrap());
        let found = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.username, "alice_12345678");
    }

    #[tokio::test]
    async fn test_duplicate_id_is_an_error() {
        let store = InMemoryProfileStore::new();
        let id = Uuid::new_v4();

        store.create(new_profile(id, "alice_1")).await.unwrap();
        let result = store.create(new_profile(id, "alice_2")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_an_error() {
        let store = InMemoryProfileStore::new();

        store
            .create(new_profile(Uuid::new_v4(), "same_name"))
            .await
            .unwrap();
        let result = store.create(new_profile(Uuid::new_v4(), "same_name")).await;
        assert!(result.is_err());
    }
}
