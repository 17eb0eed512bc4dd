//! OAuth token lifecycle: validity checks, refresh exchange, write-back.
//!
//! Every call re-resolves credentials from the source of truth; there
//! is no "last known valid" cache between top-level calls, so a
//! long-lived process pays a cheap validity check per operation and a
//! full refresh exchange only when the token has actually expired.
//!
//! The check-refresh-persist sequence runs under one async mutex per
//! manager, so two in-process operations that both observe an expired
//! token perform a single refresh between them. Concurrent *processes*
//! sharing one token file can still overwrite each other; that is an
//! accepted property of the file store.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;

use super::store::{CredentialRecord, CredentialStore};
use crate::errors::Error;

/// OAuth application registration parameters. All four refresh inputs
/// (these three plus the stored refresh token) must be present before a
/// refresh exchange is attempted.
#[derive(Debug, Clone, Default)]
pub struct OauthParams {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

/// Token endpoint response. Servers are not required to rotate the
/// refresh token, so it is optional here.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<String>,
}

pub struct TokenManager {
    store: CredentialStore,
    oauth: OauthParams,
    token_url: String,
    http: reqwest::Client,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(store: CredentialStore, oauth: OauthParams, token_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");

        Self {
            store,
            oauth,
            token_url: token_url.into(),
            http,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Return a valid access token, refreshing first if the stored one
    /// has expired.
    pub async fn get_valid_access_token(&self) -> Result<String, Error> {
        let _guard = self.refresh_lock.lock().await;

        let record = self.store.load().await?;
        if record
            .access_token
            .as_deref()
            .map_or(true, str::is_empty)
        {
            return Err(Error::Configuration(
                "credential record contains no access token".into(),
            ));
        }

        let expires_at = record.expires_at.clone().filter(|s| !s.is_empty());
        let record = match expires_at {
            Some(raw) => {
                let expiry = parse_expiry(&raw)?;
                if Utc::now() >= expiry {
                    tracing::info!(expired_at = %raw, "access token expired; refreshing");
                    self.refresh(record).await?
                } else {
                    record
                }
            }
            // No expiry recorded: treat the token as non-expiring.
            None => record,
        };

        record.access_token.ok_or_else(|| {
            Error::Configuration("refresh response contained no access token".into())
        })
    }

    /// Run the refresh exchange unconditionally and persist the result.
    /// Used by the `token refresh` CLI command.
    pub async fn force_refresh(&self) -> Result<CredentialRecord, Error> {
        let _guard = self.refresh_lock.lock().await;
        let record = self.store.load().await?;
        self.refresh(record).await
    }

    /// Exchange the refresh token for a new access token and merge the
    /// result into the record, preserving `source` and `account_id`.
    async fn refresh(&self, mut record: CredentialRecord) -> Result<CredentialRecord, Error> {
        let refresh_token = record
            .refresh_token
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| missing_refresh_params())?;
        let client_id = required(&self.oauth.client_id)?;
        let client_secret = required(&self.oauth.client_secret)?;
        let redirect_uri = required(&self.oauth.redirect_uri)?;

        let params = [
            ("type", "refresh"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
        ];

        let resp = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::upstream_transport("token refresh request failed", &e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::AuthRefresh {
                status: status.as_u16(),
                body,
            });
        }

        let refreshed: RefreshResponse = resp.json().await.map_err(|e| {
            Error::upstream_transport("invalid token refresh response", &e)
        })?;

        record.access_token = refreshed.access_token;
        // Refresh tokens are not guaranteed to rotate.
        record.refresh_token = refreshed.refresh_token.or(Some(refresh_token));
        record.expires_at = refreshed.expires_at;
        record.updated_at = Some(Utc::now().to_rfc3339());

        self.store.save(&record).await?;
        tracing::info!(source = %record.source, "access token refreshed");

        Ok(record)
    }
}

fn required(value: &Option<String>) -> Result<&str, Error> {
    value
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(missing_refresh_params)
}

fn missing_refresh_params() -> Error {
    Error::Configuration(
        "missing OAuth credentials for token refresh: \
         BASECAMP_CLIENT_ID, BASECAMP_CLIENT_SECRET, BASECAMP_REDIRECT_URI \
         and a stored refresh token are all required"
            .into(),
    )
}

/// Parse an RFC-3339 expiry timestamp, normalized to UTC. Unparseable
/// timestamps are a configuration error, never a guess at expiry.
fn parse_expiry(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Configuration(format!("unparseable expires_at {raw:?}: {e}")))
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{CredentialSource, FileProvider};

    fn manager_for(dir: &tempfile::TempDir, oauth: OauthParams) -> TokenManager {
        let path = dir.path().join("token.json");
        let store = CredentialStore::with_providers(
            vec![Box::new(FileProvider::new(path.clone()))],
            path,
        );
        // Unroutable endpoint: any attempt to call it fails loudly.
        TokenManager::new(store, oauth, "http://127.0.0.1:1/token")
    }

    async fn write_record(manager: &TokenManager, record: &CredentialRecord) {
        manager.store().save(record).await.unwrap();
    }

    fn record(access: &str, expires_at: Option<&str>) -> CredentialRecord {
        CredentialRecord {
            access_token: Some(access.into()),
            refresh_token: Some("refresh-1".into()),
            expires_at: expires_at.map(String::from),
            account_id: Some("99999".into()),
            updated_at: None,
            source: CredentialSource::File,
        }
    }

    #[test]
    fn test_parse_expiry_accepts_zulu() {
        let dt = parse_expiry("2030-06-01T12:00:00Z").unwrap();
        assert_eq!(dt.timezone(), Utc);
    }

    #[test]
    fn test_parse_expiry_accepts_offset_and_normalizes() {
        let offset = parse_expiry("2030-06-01T14:00:00+02:00").unwrap();
        let zulu = parse_expiry("2030-06-01T12:00:00Z").unwrap();
        assert_eq!(offset, zulu);
    }

    #[test]
    fn test_parse_expiry_rejects_garbage() {
        let err = parse_expiry("next tuesday").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_token_without_expiry_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(&dir, OauthParams::default());
        write_record(&manager, &record("stable-token", None)).await;

        let token = manager.get_valid_access_token().await.unwrap();
        assert_eq!(token, "stable-token");
    }

    #[tokio::test]
    async fn test_unexpired_token_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(&dir, OauthParams::default());
        write_record(
            &manager,
            &record("fresh-token", Some("2099-01-01T00:00:00Z")),
        )
        .await;

        let token = manager.get_valid_access_token().await.unwrap();
        assert_eq!(token, "fresh-token");
    }

    #[tokio::test]
    async fn test_expired_token_with_incomplete_oauth_params_fails_without_network() {
        let dir = tempfile::tempdir().unwrap();
        // No client_id/secret/redirect_uri configured. The endpoint is
        // unroutable, so reaching the network would surface as an
        // Upstream error rather than the Configuration error we expect.
        let manager = manager_for(&dir, OauthParams::default());
        write_record(
            &manager,
            &record("stale-token", Some("2020-01-01T00:00:00Z")),
        )
        .await;

        let err = manager.get_valid_access_token().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("OAuth credentials"));
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_token_fails() {
        let dir = tempfile::tempdir().unwrap();
        let oauth = OauthParams {
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            redirect_uri: Some("https://example.com/cb".into()),
        };
        let manager = manager_for(&dir, oauth);

        let mut rec = record("stale-token", Some("2020-01-01T00:00:00Z"));
        rec.refresh_token = None;
        write_record(&manager, &rec).await;

        let err = manager.get_valid_access_token().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_unparseable_expiry_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(&dir, OauthParams::default());
        write_record(&manager, &record("token", Some("not-a-date"))).await;

        let err = manager.get_valid_access_token().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("expires_at"));
    }

    #[tokio::test]
    async fn test_record_without_access_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_for(&dir, OauthParams::default());
        let mut rec = record("", Some("2020-01-01T00:00:00Z"));
        rec.access_token = None;
        write_record(&manager, &rec).await;

        let err = manager.get_valid_access_token().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("no access token"));
    }
}
