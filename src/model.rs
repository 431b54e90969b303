//! Data models for smart links
//!
//! This module defines the persisted smart link record together with the
//! request/response structures of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::export::ExportFormat;

/// Represents a smart link record stored in the database
///
/// A smart link maps a short code to a destination URL plus its access policy:
/// - Optional password that must match exactly before redirecting
/// - Optional expiry after which the link is inaccessible (but kept)
/// - Click counter, incremented on every tracked redirect
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SmartLinkRecord {
    /// Unique short code (e.g., "aB3dE9xY2q"), immutable after creation
    pub short_code: String,

    /// The destination URL visitors are redirected to
    pub original_url: String,

    /// Whether redirects increment `clicks`
    pub tracking: bool,

    /// Soft expiry; when in the past the link resolves to "expired"
    pub expiry: Option<DateTime<Utc>>,

    /// Plain-text password; `None` means the link is public
    pub password: Option<String>,

    /// Number of tracked redirects, only ever increases
    /// Defaults to 0 if not present during deserialization
    #[serde(default)]
    pub clicks: u64,

    /// Timestamp when this record was created
    pub created: DateTime<Utc>,

    /// Timestamp of the last update (destination change or click)
    pub updated: DateTime<Utc>,
}

impl SmartLinkRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry < now)
    }
}

/// Partial update applied to a stored record in a single read-modify-write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkPatch {
    /// New destination URL
    pub original_url: Option<String>,

    /// Added to `clicks`; unsigned so the counter can never go down
    pub add_clicks: u64,
}

impl LinkPatch {
    pub fn click() -> Self {
        Self { add_clicks: 1, ..Self::default() }
    }

    pub fn destination(url: impl Into<String>) -> Self {
        Self { original_url: Some(url.into()), ..Self::default() }
    }
}

/// Request payload for creating a new smart link
///
/// # Example
/// ```json
/// {
///   "url": "https://example.com/menu",
///   "tracking": true,
///   "expiry_days": 30,
///   "password": "abc123",
///   "custom_code": "menu"  // Optional
/// }
/// ```
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CreateLinkRequest {
    /// The destination URL, must be an absolute http(s) URL
    pub url: String,

    /// Click tracking, on unless explicitly disabled
    pub tracking: Option<bool>,

    /// Expire this many days from now (at least 1)
    pub expiry_days: Option<u32>,

    /// Explicit expiry timestamp; wins over `expiry_days`
    pub expires_at: Option<DateTime<Utc>>,

    /// Optional password; an empty string means no password
    pub password: Option<String>,

    /// Optional custom short code
    /// If not provided, a random 10-character code will be generated
    pub custom_code: Option<String>,
}

/// Response returned after successfully creating a smart link
///
/// # Example
/// ```json
/// {
///   "short_code": "aB3dE9xY2q",
///   "short_url": "http://localhost:8080/s/aB3dE9xY2q",
///   "original_url": "https://example.com/menu",
///   "expiry": null,
///   "protected": false,
///   "created": "2026-01-17T13:40:00Z"
/// }
/// ```
#[derive(Serialize, Deserialize, Debug)]
pub struct CreateLinkResponse {
    pub short_code: String,

    /// Public URL to encode in the QR code
    pub short_url: String,

    pub original_url: String,

    pub expiry: Option<DateTime<Utc>>,

    /// Whether a password is required
    pub protected: bool,

    pub created: DateTime<Utc>,
}

/// Request payload for changing a link's destination
#[derive(Deserialize, Debug)]
pub struct UpdateLinkRequest {
    pub url: String,
}

/// Password submitted for a protected link
#[derive(Deserialize, Debug)]
pub struct UnlockRequest {
    pub password: String,
}

/// Public statistics of a link; never includes the password
#[derive(Serialize, Deserialize, Debug)]
pub struct LinkStats {
    pub short_code: String,
    pub short_url: String,
    pub original_url: String,
    pub tracking: bool,
    pub clicks: u64,
    pub expiry: Option<DateTime<Utc>>,
    pub expired: bool,
    pub protected: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Query parameters for QR export
///
/// # Example
/// Query string: `?format=svg`
#[derive(Deserialize, Debug, Default)]
pub struct ExportParams {
    /// Output format, PNG if not provided
    pub format: Option<ExportFormat>,
}
