//! In-memory fakes for the store and object-store seams.

use crate::models::{Photo, Session, SessionStatus};
use crate::s3_uploader::ObjectStore;
use crate::store::{PhotoStore, SessionStore};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    photos: RwLock<HashMap<Uuid, Photo>>,
}

impl InMemoryStore {
    pub async fn seed_session(&self, session: &Session) {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
    }

    pub async fn seed_photo(&self, photo: &Photo) {
        self.photos.write().await.insert(photo.photo_id, photo.clone());
    }

    pub async fn attach(&self, session_id: &str, photo_id: Uuid) {
        self.append_photo(session_id, photo_id).await.unwrap();
    }

    pub async fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn photo(&self, photo_id: Uuid) -> Option<Photo> {
        self.photos.read().await.get(&photo_id).cloned()
    }

    pub async fn all_photos(&self) -> Vec<Photo> {
        self.photos.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.session_id) {
            bail!("duplicate session id {}", session.session_id);
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.session(session_id).await)
    }

    async fn mark_expired(&self, session_id: &str) -> Result<Option<Session>> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(session_id).map(|session| {
            session.status = SessionStatus::Expired;
            session.clone()
        }))
    }

    async fn list_active(&self, now: DateTime<Utc>) -> Result<Vec<Session>> {
        let mut active: Vec<Session> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_listed_active(now))
            .cloned()
            .collect();
        active.sort_by_key(|s| s.created_at);
        Ok(active)
    }

    async fn append_photo(&self, session_id: &str, photo_id: Uuid) -> Result<()> {
        match self.sessions.write().await.get_mut(session_id) {
            Some(session) => {
                session.photo_ids.push(photo_id);
                Ok(())
            }
            None => bail!("unknown session {}", session_id),
        }
    }

    async fn clear_photos(&self, session_id: &str) -> Result<()> {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.photo_ids.clear();
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl PhotoStore for InMemoryStore {
    async fn insert_photo(&self, photo: &Photo) -> Result<()> {
        let mut photos = self.photos.write().await;
        if photos
            .values()
            .any(|p| p.download_code == photo.download_code)
        {
            bail!("duplicate download code {}", photo.download_code);
        }
        photos.insert(photo.photo_id, photo.clone());
        Ok(())
    }

    async fn set_qr_code(&self, photo_id: Uuid, qr_code_url: &str) -> Result<()> {
        if let Some(photo) = self.photos.write().await.get_mut(&photo_id) {
            photo.qr_code_url = Some(qr_code_url.to_string());
        }
        Ok(())
    }

    async fn find_photo(&self, photo_id: Uuid) -> Result<Option<Photo>> {
        Ok(self.photo(photo_id).await)
    }

    async fn find_by_download_code(&self, download_code: &str) -> Result<Option<Photo>> {
        Ok(self
            .photos
            .read()
            .await
            .values()
            .find(|p| p.download_code == download_code)
            .cloned())
    }

    async fn find_photos(&self, photo_ids: &[Uuid]) -> Result<Vec<Photo>> {
        let photos = self.photos.read().await;
        Ok(photo_ids
            .iter()
            .filter_map(|id| photos.get(id).cloned())
            .collect())
    }

    async fn delete_photo(&self, photo_id: Uuid) -> Result<()> {
        self.photos.write().await.remove(&photo_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_image(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<String> {
        self.objects.write().await.insert(key.to_string(), data);
        Ok(format!("memory://{}", key))
    }

    async fn delete_image(&self, key: &str) -> Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }
}

pub fn sample_photo(session_id: &str, download_code: &str) -> Photo {
    let photo_id = Uuid::new_v4();
    Photo {
        photo_id,
        session_id: session_id.to_string(),
        original_url: format!("memory://original/{}.jpg", photo_id),
        generated_url: "https://cdn/x.png".to_string(),
        style: "anime".to_string(),
        download_code: download_code.to_string(),
        qr_code_url: None,
        created_at: Utc::now(),
    }
}
