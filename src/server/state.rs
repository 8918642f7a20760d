use crate::db::profiles::{PgProfileStore, ProfileStore};
use crate::server::auth::handover::{HandoverStore, InMemoryHandoverStore};
use crate::server::auth::session::SessionStore;
use crate::server::auth::supabase::SupabaseClient;
use crate::server::settings::Settings;
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

/// Full state for the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub supabase: Arc<SupabaseClient>,
    pub profiles: Arc<dyn ProfileStore>,
    pub sessions: Arc<SessionStore>,
    pub handover: Arc<dyn HandoverStore>,
    pub public_url: String,
    pub cookie_secure: bool,
}

impl AppState {
    /// Run database migrations
    async fn run_migrations(pool: &PgPool) -> Result<()> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .context("Failed to run migrations")?;
        tracing::info!("Migrations completed successfully");
        Ok(())
    }

    /// Initialize full state for the HTTP server
    pub async fn new_for_server(settings: &Settings) -> Result<Self> {
        tracing::info!("Initializing AppState for HTTP server");

        let db_pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&settings.database.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        tracing::info!("Successfully connected to PostgreSQL");

        Self::run_migrations(&db_pool).await?;

        // Supabase auth API client (authorize URL building + code exchange)
        let supabase = Arc::new(
            SupabaseClient::new(
                settings.supabase.url.clone(),
                settings.supabase.anon_key.clone(),
            )
            .context("Failed to initialize Supabase auth client")?,
        );
        tracing::info!("Initialized Supabase auth client for {}", settings.supabase.url);

        let profiles: Arc<dyn ProfileStore> = Arc::new(PgProfileStore::new(db_pool.clone()));

        let sessions = Arc::new(SessionStore::new(Duration::from_secs(
            settings.server.session_ttl_secs,
        )));
        tracing::info!(
            "Initialized in-memory session store (ttl={}s)",
            settings.server.session_ttl_secs
        );

        let handover: Arc<dyn HandoverStore> = Arc::new(InMemoryHandoverStore::new(
            Duration::from_secs(settings.server.handover_ttl_secs),
        ));
        tracing::info!(
            "Initialized in-memory handover token store (ttl={}s)",
            settings.server.handover_ttl_secs
        );

        let public_url = settings.server.public_url.trim_end_matches('/').to_string();
        tracing::info!("Public URL: {}", public_url);

        Ok(Self {
            db_pool,
            supabase,
            profiles,
            sessions,
            handover,
            public_url,
            cookie_secure: settings.server.cookie_secure,
        })
    }
}
