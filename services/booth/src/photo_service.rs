use crate::error::{BoothError, BoothResult};
use crate::models::{
    generate_download_code, original_image_key, stored_timestamp, Photo, PhotoDownload,
    PhotoUpload,
};
use crate::qr_code::QrEncoder;
use crate::s3_uploader::{image_content_type, ObjectStore};
use crate::store::{PhotoStore, SessionStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Photo upload, lookup and cleanup
pub struct PhotoService {
    sessions: Arc<dyn SessionStore>,
    photos: Arc<dyn PhotoStore>,
    objects: Arc<dyn ObjectStore>,
    qr: QrEncoder,
}

/// Validated upload fields
struct UploadRequest {
    session_id: String,
    style: String,
    generated_url: String,
    image: Vec<u8>,
    content_type: String,
}

impl UploadRequest {
    fn validate(upload: PhotoUpload) -> BoothResult<Self> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        let image = upload.image.filter(|bytes| !bytes.is_empty());
        let session_id = present(upload.session_id);
        let style = present(upload.style);
        let generated_url = present(upload.generated_url);

        match (image, session_id, style, generated_url) {
            (Some(image), Some(session_id), Some(style), Some(generated_url)) => Ok(Self {
                session_id,
                style,
                generated_url,
                image,
                content_type: image_content_type(upload.content_type.as_deref()),
            }),
            _ => Err(BoothError::bad_request("Missing required fields")),
        }
    }
}

impl PhotoService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        photos: Arc<dyn PhotoStore>,
        objects: Arc<dyn ObjectStore>,
        qr: QrEncoder,
    ) -> Self {
        Self {
            sessions,
            photos,
            objects,
            qr,
        }
    }

    /// Store an uploaded photo and attach it to its session.
    ///
    /// The steps are not atomic. A failure after the image is written leaves
    /// the blob (and possibly a record without a QR code) behind.
    #[instrument(skip(self, upload), fields(session_id = ?upload.session_id, style = ?upload.style))]
    pub async fn upload(&self, upload: PhotoUpload) -> BoothResult<Photo> {
        let request = UploadRequest::validate(upload)?;
        let started = Instant::now();

        self.sessions
            .find_session(&request.session_id)
            .await
            .map_err(BoothError::internal("Failed to upload photo"))?
            .ok_or_else(|| BoothError::not_found("Session not found"))?;

        let photo_id = Uuid::new_v4();
        let download_code = generate_download_code();
        let key = original_image_key(photo_id);
        let size_bytes = request.image.len();

        let original_url = self
            .objects
            .put_image(&key, request.image, &request.content_type)
            .await
            .map_err(BoothError::upstream("Failed to upload photo"))?;

        let mut photo = Photo {
            photo_id,
            session_id: request.session_id,
            original_url,
            generated_url: request.generated_url,
            style: request.style,
            download_code,
            qr_code_url: None,
            created_at: stored_timestamp(Utc::now()),
        };

        self.photos
            .insert_photo(&photo)
            .await
            .map_err(BoothError::internal("Failed to upload photo"))?;

        let qr_code_url = self
            .qr
            .download_qr(&photo.download_code)
            .map_err(BoothError::internal("Failed to generate QR code"))?;

        self.photos
            .set_qr_code(photo.photo_id, &qr_code_url)
            .await
            .map_err(BoothError::internal("Failed to generate QR code"))?;
        photo.qr_code_url = Some(qr_code_url);

        self.sessions
            .append_photo(&photo.session_id, photo.photo_id)
            .await
            .map_err(BoothError::internal("Failed to upload photo"))?;

        metrics::counter!("booth.photos.uploaded").increment(1);
        metrics::counter!("booth.bytes.uploaded").increment(size_bytes as u64);
        metrics::histogram!("booth.upload.duration_seconds")
            .record(started.elapsed().as_secs_f64());

        info!(
            photo_id = %photo.photo_id,
            download_code = %photo.download_code,
            size_bytes,
            "Photo uploaded"
        );

        Ok(photo)
    }

    /// Public download data for a code
    #[instrument(skip(self))]
    pub async fn get_by_download_code(&self, download_code: &str) -> BoothResult<PhotoDownload> {
        self.photos
            .find_by_download_code(download_code)
            .await
            .map_err(BoothError::internal("Failed to get photo"))?
            .map(PhotoDownload::from)
            .ok_or_else(|| BoothError::not_found("Photo not found"))
    }

    /// Delete every photo of a session, then clear its photo list.
    ///
    /// Sequential and not transactional: on error, photos already handled stay
    /// deleted and the session's list is left untouched.
    #[instrument(skip(self))]
    pub async fn delete_for_session(&self, session_id: &str) -> BoothResult<usize> {
        let session = self
            .sessions
            .find_session(session_id)
            .await
            .map_err(BoothError::internal("Failed to delete photos"))?
            .ok_or_else(|| BoothError::not_found("Session not found"))?;

        let mut deleted = 0;

        for photo_id in &session.photo_ids {
            let photo = self
                .photos
                .find_photo(*photo_id)
                .await
                .map_err(BoothError::internal("Failed to delete photos"))?;

            let Some(photo) = photo else {
                warn!(photo_id = %photo_id, "Session references a missing photo");
                continue;
            };

            self.objects
                .delete_image(&original_image_key(photo.photo_id))
                .await
                .map_err(BoothError::upstream("Failed to delete photos"))?;

            self.photos
                .delete_photo(photo.photo_id)
                .await
                .map_err(BoothError::internal("Failed to delete photos"))?;

            deleted += 1;
        }

        self.sessions
            .clear_photos(session_id)
            .await
            .map_err(BoothError::internal("Failed to delete photos"))?;

        metrics::counter!("booth.photos.deleted").increment(deleted as u64);
        info!(session_id = %session_id, deleted, "Session photos deleted");

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Session;
    use crate::s3_uploader::MockObjectStore;
    use crate::store::{MockPhotoStore, MockSessionStore};
    use crate::test_support::{sample_photo, InMemoryObjectStore, InMemoryStore};

    struct Fixture {
        store: Arc<InMemoryStore>,
        objects: Arc<InMemoryObjectStore>,
        service: PhotoService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::default());
        let objects = Arc::new(InMemoryObjectStore::default());
        let service = PhotoService::new(
            store.clone(),
            store.clone(),
            objects.clone(),
            QrEncoder::new("http://localhost:5173"),
        );
        Fixture {
            store,
            objects,
            service,
        }
    }

    async fn seeded_session(store: &InMemoryStore) -> Session {
        let session = Session::new(Utc::now(), chrono::Duration::hours(24));
        store.seed_session(&session).await;
        session
    }

    fn upload_for(session_id: &str) -> PhotoUpload {
        PhotoUpload {
            session_id: Some(session_id.to_string()),
            style: Some("anime".to_string()),
            generated_url: Some("https://cdn/x.png".to_string()),
            image: Some(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]),
            content_type: Some("image/jpeg".to_string()),
        }
    }

    #[tokio::test]
    async fn test_upload_persists_everything() {
        let fx = fixture();
        let session = seeded_session(&fx.store).await;

        let photo = fx.service.upload(upload_for(&session.session_id)).await.unwrap();

        assert_eq!(photo.download_code.len(), 8);
        assert_eq!(photo.style, "anime");
        assert_eq!(photo.generated_url, "https://cdn/x.png");
        assert!(photo
            .qr_code_url
            .as_deref()
            .unwrap()
            .starts_with("data:image/png;base64,"));

        let key = original_image_key(photo.photo_id);
        assert!(fx.objects.contains(&key).await);
        assert_eq!(photo.original_url, format!("memory://{}", key));

        let stored = fx.store.photo(photo.photo_id).await.unwrap();
        assert_eq!(stored.qr_code_url, photo.qr_code_url);

        let session = fx.store.session(&session.session_id).await.unwrap();
        assert_eq!(session.photo_ids, vec![photo.photo_id]);
    }

    #[tokio::test]
    async fn test_upload_timestamp_matches_storage_precision() {
        let fx = fixture();
        let session = seeded_session(&fx.store).await;

        let photo = fx.service.upload(upload_for(&session.session_id)).await.unwrap();

        assert_eq!(photo.created_at.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[tokio::test]
    async fn test_upload_missing_style_performs_no_writes() {
        // Any call into a collaborator would panic on the bare mocks
        let service = PhotoService::new(
            Arc::new(MockSessionStore::new()),
            Arc::new(MockPhotoStore::new()),
            Arc::new(MockObjectStore::new()),
            QrEncoder::new("http://localhost:5173"),
        );

        let mut upload = upload_for("a1b2c3d4");
        upload.style = None;

        let result = service.upload(upload).await;
        assert!(matches!(result, Err(BoothError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_upload_rejects_blank_fields() {
        let fx = fixture();

        let mut blank_style = upload_for("a1b2c3d4");
        blank_style.style = Some("   ".to_string());
        assert!(matches!(
            fx.service.upload(blank_style).await,
            Err(BoothError::BadRequest(_))
        ));

        let mut empty_image = upload_for("a1b2c3d4");
        empty_image.image = Some(Vec::new());
        assert!(matches!(
            fx.service.upload(empty_image).await,
            Err(BoothError::BadRequest(_))
        ));

        let mut no_session = upload_for("a1b2c3d4");
        no_session.session_id = None;
        assert!(matches!(
            fx.service.upload(no_session).await,
            Err(BoothError::BadRequest(_))
        ));

        assert_eq!(fx.objects.len().await, 0);
    }

    #[tokio::test]
    async fn test_upload_unknown_session_writes_nothing() {
        let fx = fixture();

        let result = fx.service.upload(upload_for("missing")).await;

        assert!(matches!(result, Err(BoothError::NotFound(_))));
        assert_eq!(fx.objects.len().await, 0);
    }

    #[tokio::test]
    async fn test_upload_object_store_failure_is_upstream() {
        let store = Arc::new(InMemoryStore::default());
        let session = seeded_session(&store).await;

        let mut objects = MockObjectStore::new();
        objects
            .expect_put_image()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("bucket not found")));

        let service = PhotoService::new(
            store.clone(),
            store.clone(),
            Arc::new(objects),
            QrEncoder::new("http://localhost:5173"),
        );

        let result = service.upload(upload_for(&session.session_id)).await;
        assert!(matches!(result, Err(BoothError::Upstream { .. })));
        assert!(store.session(&session.session_id).await.unwrap().photo_ids.is_empty());
    }

    #[tokio::test]
    async fn test_qr_failure_leaves_photo_without_qr_code() {
        let store = Arc::new(InMemoryStore::default());
        let session = seeded_session(&store).await;
        let objects = Arc::new(InMemoryObjectStore::default());

        // A download URL too long to fit in any QR version
        let service = PhotoService::new(
            store.clone(),
            store.clone(),
            objects.clone(),
            QrEncoder::new(format!("https://{}", "x".repeat(8_000))),
        );

        let result = service.upload(upload_for(&session.session_id)).await;
        assert!(matches!(result, Err(BoothError::Internal { .. })));

        // Blob and record remain; no rollback
        assert_eq!(objects.len().await, 1);
        let photos = store.all_photos().await;
        assert_eq!(photos.len(), 1);
        assert!(photos[0].qr_code_url.is_none());
        assert!(store.session(&session.session_id).await.unwrap().photo_ids.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_only_by_download_code() {
        let fx = fixture();
        let session = seeded_session(&fx.store).await;
        let photo = fx.service.upload(upload_for(&session.session_id)).await.unwrap();

        let download = fx
            .service
            .get_by_download_code(&photo.download_code)
            .await
            .unwrap();
        assert_eq!(download.original_url, photo.original_url);
        assert_eq!(download.generated_url, "https://cdn/x.png");
        assert_eq!(download.style, "anime");
        assert_eq!(download.created_at, photo.created_at);

        for other in [photo.photo_id.to_string(), session.session_id.clone()] {
            assert!(matches!(
                fx.service.get_by_download_code(&other).await,
                Err(BoothError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_delete_for_session_removes_blobs_and_records() {
        let fx = fixture();
        let session = seeded_session(&fx.store).await;
        for _ in 0..3 {
            fx.service.upload(upload_for(&session.session_id)).await.unwrap();
        }
        assert_eq!(fx.objects.len().await, 3);

        let deleted = fx.service.delete_for_session(&session.session_id).await.unwrap();

        assert_eq!(deleted, 3);
        assert_eq!(fx.objects.len().await, 0);
        assert!(fx.store.all_photos().await.is_empty());
        assert!(fx.store.session(&session.session_id).await.unwrap().photo_ids.is_empty());
    }

    #[tokio::test]
    async fn test_delete_for_session_skips_dangling_references() {
        let fx = fixture();
        let session = seeded_session(&fx.store).await;
        let kept = sample_photo(&session.session_id, "keep0001");
        fx.store.seed_photo(&kept).await;
        fx.store.attach(&session.session_id, Uuid::new_v4()).await;
        fx.store.attach(&session.session_id, kept.photo_id).await;

        let deleted = fx.service.delete_for_session(&session.session_id).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(fx.store.session(&session.session_id).await.unwrap().photo_ids.is_empty());
    }

    #[tokio::test]
    async fn test_delete_for_unknown_session() {
        let fx = fixture();
        assert!(matches!(
            fx.service.delete_for_session("missing").await,
            Err(BoothError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_failure_mid_loop_keeps_list() {
        let store = Arc::new(InMemoryStore::default());
        let session = seeded_session(&store).await;
        let first = sample_photo(&session.session_id, "abcd0001");
        let second = sample_photo(&session.session_id, "abcd0002");
        for photo in [&first, &second] {
            store.seed_photo(photo).await;
            store.attach(&session.session_id, photo.photo_id).await;
        }

        let failing_key = original_image_key(second.photo_id);
        let mut objects = MockObjectStore::new();
        objects
            .expect_delete_image()
            .times(2)
            .returning(move |key| {
                if key == failing_key {
                    Err(anyhow::anyhow!("access denied"))
                } else {
                    Ok(())
                }
            });

        let service = PhotoService::new(
            store.clone(),
            store.clone(),
            Arc::new(objects),
            QrEncoder::new("http://localhost:5173"),
        );

        let result = service.delete_for_session(&session.session_id).await;
        assert!(matches!(result, Err(BoothError::Upstream { .. })));

        assert!(store.photo(first.photo_id).await.is_none());
        assert!(store.photo(second.photo_id).await.is_some());
        assert_eq!(
            store.session(&session.session_id).await.unwrap().photo_ids,
            vec![first.photo_id, second.photo_id]
        );
    }
}
