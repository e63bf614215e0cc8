//! Persistence seams for sessions and photos.
//!
//! [`MetadataStore`](crate::metadata_store::MetadataStore) implements both
//! traits against PostgreSQL.

use crate::models::{Photo, Session};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session; fails if the id already exists
    async fn insert_session(&self, session: &Session) -> Result<()>;

    async fn find_session(&self, session_id: &str) -> Result<Option<Session>>;

    /// Set `status = expired`, returning the updated row if it exists
    async fn mark_expired(&self, session_id: &str) -> Result<Option<Session>>;

    /// Sessions with `status = active` and `expires_at > now`
    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Session>>;

    /// Append a photo id to the end of the session's photo list
    async fn append_photo(&self, session_id: &str, photo_id: Uuid) -> Result<()>;

    /// Empty the session's photo list
    async fn clear_photos(&self, session_id: &str) -> Result<()>;

    /// Connectivity probe used by the readiness endpoint
    async fn ping(&self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Insert a new photo; fails on duplicate id or download code
    async fn insert_photo(&self, photo: &Photo) -> Result<()>;

    async fn set_qr_code(&self, photo_id: Uuid, qr_code_url: &str) -> Result<()>;

    async fn find_photo(&self, photo_id: Uuid) -> Result<Option<Photo>>;

    async fn find_by_download_code(&self, download_code: &str) -> Result<Option<Photo>>;

    /// Photos with the given ids, in the order of `photo_ids`; missing ids are skipped
    async fn find_photos(&self, photo_ids: &[Uuid]) -> Result<Vec<Photo>>;

    async fn delete_photo(&self, photo_id: Uuid) -> Result<()>;
}
