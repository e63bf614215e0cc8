//! Boothme Booth Service
//!
//! Backend for the Boothme AI photobooth. A booth client opens a timed
//! session, uploads each captured photo together with the URL of its
//! stylized version, and gets back a QR code pointing at a short-lived
//! download page.
//!
//! ## Features
//!
//! - **Sessions**: 24-hour validity windows, ended explicitly over HTTP or
//!   the realtime WebSocket channel
//! - **Photo Storage**: original captures in S3 under `original/{photoId}.jpg`,
//!   records and session photo lists in PostgreSQL
//! - **Download Codes**: 8-character public handles encoded into PNG QR codes
//! - **Image Pass-through**: remote generated images returned as `data:` URLs
//!
//! ## Architecture
//!
//! ```text
//!  Booth client                                       PostgreSQL
//! ┌──────────────┐   HTTP    ┌──────────────┐        ┌──────────────┐
//! │ Vue SPA      │──────────▶│ API          │        │ sessions     │
//! │              │◀──────────│ (axum)       │        │ photos       │
//! └──────────────┘    WS     └──────────────┘        └──────────────┘
//!                               │       │                    ▲
//!                               ▼       ▼                    │
//!                    ┌──────────────┐ ┌──────────────┐       │
//!                    │ Session      │ │ Photo        │───────┤
//!                    │ Service      │ │ Service      │       │
//!                    └──────────────┘ └──────────────┘       │
//!                           │           │       │            │
//!                           └───────────┼───────┼────────────┘
//!                                       ▼       ▼
//!                              ┌──────────┐ ┌──────────┐
//!                              │ S3       │ │ QR       │
//!                              │ Uploader │ │ Encoder  │
//!                              └──────────┘ └──────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod image_proxy;
pub mod metadata_store;
pub mod models;
pub mod photo_service;
pub mod qr_code;
pub mod realtime;
pub mod s3_uploader;
pub mod session_service;
pub mod store;

#[cfg(test)]
mod test_support;

pub use api::{create_router, start_api_server, AppState};
pub use config::Config;
pub use error::{BoothError, BoothResult};
pub use metadata_store::MetadataStore;
pub use models::{Photo, PhotoDownload, Session, SessionDetails, SessionStatus};
pub use photo_service::PhotoService;
pub use qr_code::QrEncoder;
pub use s3_uploader::{ObjectStore, S3Uploader};
pub use session_service::SessionService;
pub use store::{PhotoStore, SessionStore};
