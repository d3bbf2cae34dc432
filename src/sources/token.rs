use crate::credentials::Credentials;
use crate::store::Database;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Token endpoint response (OAuth2 refresh grant)
#[derive(Debug, Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

/// OAuth client settings for the refresh grant
#[derive(Clone, Debug)]
pub struct OAuthClient {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Holds the cloud API credentials and refreshes them on demand.
///
/// All access goes through one async mutex, so concurrent callers wait for a
/// single in-flight refresh instead of racing.
pub struct TokenManager {
    source: String,
    oauth: OAuthClient,
    http_client: reqwest::Client,
    credentials: Mutex<Credentials>,
    store: Option<Arc<Database>>,
}

impl TokenManager {
    pub fn new(
        source: impl Into<String>,
        oauth: OAuthClient,
        http_client: reqwest::Client,
        credentials: Credentials,
        store: Option<Arc<Database>>,
    ) -> Self {
        Self {
            source: source.into(),
            oauth,
            http_client,
            credentials: Mutex::new(credentials),
            store,
        }
    }

    /// Build from stored credentials, falling back to the bootstrap refresh token.
    pub fn load(
        source: &str,
        oauth: OAuthClient,
        http_client: reqwest::Client,
        bootstrap_refresh_token: Option<&str>,
        store: Option<Arc<Database>>,
    ) -> Result<Self> {
        let stored = match &store {
            Some(db) => db.load_credentials(source)?,
            None => None,
        };

        let credentials = match (stored, bootstrap_refresh_token) {
            (Some(creds), _) => {
                info!(source = %source, "Using stored credentials");
                creds
            }
            (None, Some(token)) if !token.is_empty() => Credentials::from_refresh_token(token),
            _ => bail!("No credentials configured for {}", source),
        };

        Ok(Self::new(source, oauth, http_client, credentials, store))
    }

    /// A valid access token, refreshing first if it is missing or about to expire.
    pub async fn access_token(&self) -> Result<String> {
        let mut credentials = self.credentials.lock().await;

        if credentials.needs_refresh(Utc::now()) {
            let refreshed = self.refresh(&credentials).await?;
            *credentials = refreshed;
        }

        if credentials.access_token.is_empty() {
            bail!("No access token available for {}", self.source);
        }

        Ok(credentials.access_token.clone())
    }

    /// Current credentials snapshot
    pub async fn credentials(&self) -> Credentials {
        self.credentials.lock().await.clone()
    }

    async fn refresh(&self, current: &Credentials) -> Result<Credentials> {
        let Some(refresh_token) = current.refresh_token.clone() else {
            bail!("No refresh token available for {}", self.source);
        };

        let mut form: HashMap<&str, String> = HashMap::new();
        form.insert("grant_type", "refresh_token".to_string());
        form.insert("refresh_token", refresh_token);
        form.insert("client_id", self.oauth.client_id.clone());
        if !self.oauth.client_secret.is_empty() {
            form.insert("client_secret", self.oauth.client_secret.clone());
        }

        info!(source = %self.source, "Refreshing OAuth token");

        let response = self
            .http_client
            .post(&self.oauth.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .context("Failed to send token refresh request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            bail!("Token refresh failed with status {}: {}", status, body);
        }

        let token_response: TokenRefreshResponse = response
            .json()
            .await
            .context("Failed to parse token refresh response")?;

        let refreshed = Credentials {
            access_token: token_response.access_token,
            // Keep the existing refresh token if the provider did not rotate it
            refresh_token: token_response
                .refresh_token
                .or_else(|| current.refresh_token.clone()),
            expires_at: token_response
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        };

        if let Some(db) = &self.store {
            if let Err(e) = db.save_credentials(&self.source, &refreshed) {
                warn!(source = %self.source, error = %e, "Failed to persist refreshed credentials");
            }
        }

        info!(
            source = %self.source,
            expires_at = ?refreshed.expires_at,
            "OAuth token refreshed"
        );

        Ok(refreshed)
    }
}
