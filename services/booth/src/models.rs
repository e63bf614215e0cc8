use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(anyhow::anyhow!("Unknown session status: {}", other)),
        }
    }
}

/// A bounded-time grouping of photos
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    /// Photo ids in attach order
    #[serde(rename = "photos")]
    pub photo_ids: Vec<Uuid>,
}

impl Session {
    /// New active session valid for `ttl` from `now`
    pub fn new(now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        let now = stored_timestamp(now);
        Self {
            session_id: Uuid::new_v4().to_string(),
            created_at: now,
            expires_at: now + ttl,
            status: SessionStatus::Active,
            photo_ids: Vec::new(),
        }
    }

    /// Whether the session was ended or its window has lapsed.
    ///
    /// Advisory only: a lapsed session keeps `status = active` in storage
    /// until it is explicitly ended.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Expired || self.expires_at <= now
    }

    /// Active and inside its validity window
    pub fn is_listed_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && self.expires_at > now
    }
}

/// Round to the microsecond precision PostgreSQL keeps for `TIMESTAMPTZ`
pub fn stored_timestamp(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// Session with its photos resolved, in attach order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub photos: Vec<Photo>,
}

impl SessionDetails {
    pub fn new(session: Session, photos: Vec<Photo>) -> Self {
        Self {
            session_id: session.session_id,
            created_at: session.created_at,
            expires_at: session.expires_at,
            status: session.status,
            photos,
        }
    }
}

/// Stored photo record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub photo_id: Uuid,
    pub session_id: String,
    pub original_url: String,
    pub generated_url: String,
    pub style: String,
    /// Short public lookup token
    pub download_code: String,
    /// PNG data URL; unset until the QR code has been generated
    pub qr_code_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public view of a photo, keyed by download code
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoDownload {
    pub original_url: String,
    pub generated_url: String,
    pub style: String,
    pub created_at: DateTime<Utc>,
}

impl From<Photo> for PhotoDownload {
    fn from(p: Photo) -> Self {
        Self {
            original_url: p.original_url,
            generated_url: p.generated_url,
            style: p.style,
            created_at: p.created_at,
        }
    }
}

/// Upload received from a booth client
#[derive(Debug, Clone, Default)]
pub struct PhotoUpload {
    pub session_id: Option<String>,
    pub style: Option<String>,
    pub generated_url: Option<String>,
    pub image: Option<Vec<u8>>,
    pub content_type: Option<String>,
}

/// Length of the public download code
pub const DOWNLOAD_CODE_LEN: usize = 8;

/// Generate a short download code from a fresh UUID
pub fn generate_download_code() -> String {
    let mut code = Uuid::new_v4().simple().to_string();
    code.truncate(DOWNLOAD_CODE_LEN);
    code
}

/// Object key for a photo's as-captured image
pub fn original_image_key(photo_id: Uuid) -> String {
    format!("original/{}.jpg", photo_id)
}
