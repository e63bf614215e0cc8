use crate::config::DatabaseConfig;
use crate::models::{Photo, Session, SessionStatus};
use crate::store::{PhotoStore, SessionStore};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Session row as stored; `status` is kept as text
#[derive(Debug, FromRow)]
struct SessionRow {
    session_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
    photo_ids: Vec<Uuid>,
}

impl TryFrom<SessionRow> for Session {
    type Error = anyhow::Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(Self {
            status: row.status.parse::<SessionStatus>()?,
            session_id: row.session_id,
            created_at: row.created_at,
            expires_at: row.expires_at,
            photo_ids: row.photo_ids,
        })
    }
}

const SESSION_COLUMNS: &str = "session_id, created_at, expires_at, status, photo_ids";

const PHOTO_COLUMNS: &str = "photo_id, session_id, original_url, generated_url, style, \
                             download_code, qr_code_url, created_at";

/// PostgreSQL-backed session and photo store
pub struct MetadataStore {
    pool: PgPool,
}

impl MetadataStore {
    /// Create a new metadata store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionStore for MetadataStore {
    #[instrument(skip(self, session), fields(session_id = %session.session_id))]
    async fn insert_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, created_at, expires_at, status, photo_ids)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.status.as_str())
        .bind(&session.photo_ids)
        .execute(&self.pool)
        .await
        .context("Failed to insert session")?;

        debug!("Session inserted");
        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query session")?;

        row.map(Session::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn mark_expired(&self, session_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE sessions
            SET status = 'expired', updated_at = NOW()
            WHERE session_id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to expire session")?;

        row.map(Session::try_from).transpose()
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE status = 'active' AND expires_at > $1
            ORDER BY created_at ASC
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list active sessions")?;

        rows.into_iter().map(Session::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn append_photo(&self, session_id: &str, photo_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET photo_ids = array_append(photo_ids, $2), updated_at = NOW()
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .bind(photo_id)
        .execute(&self.pool)
        .await
        .context("Failed to attach photo to session")?;

        if result.rows_affected() == 0 {
            bail!("Session {} disappeared before photo could be attached", session_id);
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_photos(&self, session_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET photo_ids = '{}', updated_at = NOW()
            WHERE session_id = $1
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .context("Failed to clear session photos")?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Database ping failed")?;
        Ok(())
    }
}

#[async_trait]
impl PhotoStore for MetadataStore {
    #[instrument(skip(self, photo), fields(photo_id = %photo.photo_id, download_code = %photo.download_code))]
    async fn insert_photo(&self, photo: &Photo) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO photos (
                photo_id, session_id, original_url, generated_url,
                style, download_code, qr_code_url, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8
            )
            "#,
        )
        .bind(photo.photo_id)
        .bind(&photo.session_id)
        .bind(&photo.original_url)
        .bind(&photo.generated_url)
        .bind(&photo.style)
        .bind(&photo.download_code)
        .bind(&photo.qr_code_url)
        .bind(photo.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert photo")?;

        debug!("Photo inserted");
        Ok(())
    }

    #[instrument(skip(self, qr_code_url))]
    async fn set_qr_code(&self, photo_id: Uuid, qr_code_url: &str) -> Result<()> {
        sqlx::query("UPDATE photos SET qr_code_url = $2, updated_at = NOW() WHERE photo_id = $1")
            .bind(photo_id)
            .bind(qr_code_url)
            .execute(&self.pool)
            .await
            .context("Failed to store QR code")?;

        Ok(())
    }

    async fn find_photo(&self, photo_id: Uuid) -> Result<Option<Photo>> {
        let photo = sqlx::query_as::<_, Photo>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE photo_id = $1"
        ))
        .bind(photo_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query photo")?;

        Ok(photo)
    }

    async fn find_by_download_code(&self, download_code: &str) -> Result<Option<Photo>> {
        let photo = sqlx::query_as::<_, Photo>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE download_code = $1"
        ))
        .bind(download_code)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query photo by download code")?;

        Ok(photo)
    }

    async fn find_photos(&self, photo_ids: &[Uuid]) -> Result<Vec<Photo>> {
        if photo_ids.is_empty() {
            return Ok(Vec::new());
        }

        // Keep the session's list order
        let photos = sqlx::query_as::<_, Photo>(
            r#"
            SELECT p.photo_id, p.session_id, p.original_url, p.generated_url, p.style,
                   p.download_code, p.qr_code_url, p.created_at
            FROM unnest($1::uuid[]) WITH ORDINALITY AS ids(photo_id, ord)
            JOIN photos p ON p.photo_id = ids.photo_id
            ORDER BY ids.ord
            "#,
        )
        .bind(photo_ids)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query session photos")?;

        Ok(photos)
    }

    #[instrument(skip(self))]
    async fn delete_photo(&self, photo_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM photos WHERE photo_id = $1")
            .bind(photo_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete photo")?;

        Ok(())
    }
}
