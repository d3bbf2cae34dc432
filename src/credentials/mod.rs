//! OAuth credentials for the cloud vehicle API.
//!
//! Credentials are persisted in the `credentials` table of the main database
//! (see [`crate::store::Database::save_credentials`]) so refreshed tokens survive
//! restarts.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Refresh this long before the access token expires
pub const REFRESH_MARGIN_SECONDS: i64 = 90;

/// Credentials for accessing an external API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    /// OAuth access token (used for API requests). Empty until first refresh.
    pub access_token: String,

    /// OAuth refresh token (used to obtain new access tokens)
    pub refresh_token: Option<String>,

    /// When the access token expires (UTC)
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Bootstrap credentials holding only a refresh token.
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: Some(refresh_token.into()),
            expires_at: None,
        }
    }

    /// True if the access token should be refreshed before the next request.
    ///
    /// Requires a refresh token. Triggers when no access token is held yet, or
    /// when `expires_at` is within 90 seconds (or already past).
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        if self.refresh_token.is_none() {
            return false;
        }
        if self.access_token.is_empty() {
            return true;
        }
        match self.expires_at {
            Some(expires_at) => expires_at <= now + Duration::seconds(REFRESH_MARGIN_SECONDS),
            None => false,
        }
    }
}
