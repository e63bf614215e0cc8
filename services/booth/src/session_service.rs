use crate::error::{BoothError, BoothResult};
use crate::models::{Session, SessionDetails};
use crate::store::{PhotoStore, SessionStore};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

/// Session lifecycle operations
pub struct SessionService {
    sessions: Arc<dyn SessionStore>,
    photos: Arc<dyn PhotoStore>,
    ttl: chrono::Duration,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        photos: Arc<dyn PhotoStore>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            sessions,
            photos,
            ttl,
        }
    }

    /// Start a new active session
    #[instrument(skip(self))]
    pub async fn create(&self) -> BoothResult<Session> {
        let session = Session::new(Utc::now(), self.ttl);

        self.sessions
            .insert_session(&session)
            .await
            .map_err(BoothError::internal("Failed to create session"))?;

        metrics::counter!("booth.sessions.created").increment(1);
        info!(
            session_id = %session.session_id,
            expires_at = %session.expires_at,
            "Session created"
        );

        Ok(session)
    }

    /// Session with its photos populated
    #[instrument(skip(self))]
    pub async fn get(&self, session_id: &str) -> BoothResult<SessionDetails> {
        let session = self.find(session_id).await?;

        let photos = self
            .photos
            .find_photos(&session.photo_ids)
            .await
            .map_err(BoothError::internal("Failed to get session"))?;

        Ok(SessionDetails::new(session, photos))
    }

    /// Mark a session expired; ending an expired session is a no-op
    #[instrument(skip(self))]
    pub async fn end(&self, session_id: &str) -> BoothResult<Session> {
        let session = self
            .sessions
            .mark_expired(session_id)
            .await
            .map_err(BoothError::internal("Failed to end session"))?
            .ok_or_else(|| BoothError::not_found("Session not found"))?;

        metrics::counter!("booth.sessions.ended").increment(1);
        info!(session_id = %session.session_id, "Session ended");

        Ok(session)
    }

    /// Active sessions whose window has not lapsed
    pub async fn list_active(&self) -> BoothResult<Vec<Session>> {
        self.sessions
            .list_active(Utc::now())
            .await
            .map_err(BoothError::internal("Failed to get sessions"))
    }

    /// Fetch a bare session record
    pub async fn find(&self, session_id: &str) -> BoothResult<Session> {
        self.sessions
            .find_session(session_id)
            .await
            .map_err(BoothError::internal("Failed to get session"))?
            .ok_or_else(|| BoothError::not_found("Session not found"))
    }
}
