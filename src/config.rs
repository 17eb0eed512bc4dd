use std::path::PathBuf;

use crate::auth::store::CredentialRecord;
use crate::errors::Error;

/// Default Basecamp 4 API host. The account id is appended as the first
/// path segment to form the per-account base URL.
pub const DEFAULT_API_HOST: &str = "https://3.basecampapi.com";

/// Authorization-server endpoint for the OAuth refresh exchange.
pub const DEFAULT_AUTH_TOKEN_URL: &str = "https://launchpad.37signals.com/authorization/token";

#[derive(Debug, Clone)]
pub struct Config {
    /// Account id override from BASECAMP_ACCOUNT_ID. When unset, the id
    /// stored in the token file is used instead.
    pub account_id: Option<String>,
    /// Identifying User-Agent sent on every API request.
    /// Set via USER_AGENT env var. Default: "Basecamp MCP Server".
    pub user_agent: String,
    /// API host without the account segment. Overridable for tests.
    pub api_host: String,
    /// Token endpoint used for the refresh exchange. Overridable for tests.
    pub auth_token_url: String,
    /// Fallback credential file consulted when BASECAMP_ACCESS_TOKEN is unset.
    pub token_file: PathBuf,
    /// OAuth application registration, required only when a refresh
    /// exchange is actually needed.
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    /// Upper bound on pages walked per paginated fetch.
    /// Set via BASECAMP_MAX_PAGES env var. Default: 100.
    pub max_pages: usize,
}

impl Config {
    /// Per-account base URL all resource URLs hang off of.
    pub fn api_base_url(&self, account_id: &str) -> String {
        format!("{}/{}", self.api_host.trim_end_matches('/'), account_id)
    }

    /// Resolve the account id: environment override first, then the
    /// already-loaded credential record.
    pub fn resolve_account_id(&self, record: &CredentialRecord) -> Result<String, Error> {
        if let Some(id) = self.account_id.as_deref().filter(|s| !s.is_empty()) {
            return Ok(id.to_string());
        }
        record
            .account_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(String::from)
            .ok_or_else(|| {
                Error::Configuration(
                    "BASECAMP_ACCOUNT_ID not found in environment or token file".into(),
                )
            })
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    Ok(Config {
        account_id: std::env::var("BASECAMP_ACCOUNT_ID")
            .ok()
            .filter(|s| !s.is_empty()),
        user_agent: std::env::var("USER_AGENT").unwrap_or_else(|_| "Basecamp MCP Server".into()),
        api_host: std::env::var("BASECAMP_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_API_HOST.into()),
        auth_token_url: std::env::var("BASECAMP_AUTH_TOKEN_URL")
            .unwrap_or_else(|_| DEFAULT_AUTH_TOKEN_URL.into()),
        token_file: std::env::var("BASECAMP_TOKEN_FILE")
            .unwrap_or_else(|_| "token.json".into())
            .into(),
        client_id: std::env::var("BASECAMP_CLIENT_ID").ok(),
        client_secret: std::env::var("BASECAMP_CLIENT_SECRET").ok(),
        redirect_uri: std::env::var("BASECAMP_REDIRECT_URI").ok(),
        max_pages: std::env::var("BASECAMP_MAX_PAGES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100),
    })
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::CredentialSource;

    fn test_config(account_id: Option<&str>) -> Config {
        Config {
            account_id: account_id.map(String::from),
            user_agent: "Basecamp MCP Server".into(),
            api_host: DEFAULT_API_HOST.into(),
            auth_token_url: DEFAULT_AUTH_TOKEN_URL.into(),
            token_file: "token.json".into(),
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            max_pages: 100,
        }
    }

    fn record_with_account(account_id: Option<&str>) -> CredentialRecord {
        CredentialRecord {
            access_token: Some("tok".into()),
            refresh_token: None,
            expires_at: None,
            account_id: account_id.map(String::from),
            updated_at: None,
            source: CredentialSource::File,
        }
    }

    #[test]
    fn test_api_base_url_appends_account_segment() {
        let cfg = test_config(Some("99999"));
        assert_eq!(cfg.api_base_url("99999"), "https://3.basecampapi.com/99999");
    }

    #[test]
    fn test_api_base_url_tolerates_trailing_slash() {
        let mut cfg = test_config(None);
        cfg.api_host = "http://localhost:8080/".into();
        assert_eq!(cfg.api_base_url("1"), "http://localhost:8080/1");
    }

    #[test]
    fn test_account_id_env_override_wins() {
        let cfg = test_config(Some("from-env"));
        let record = record_with_account(Some("from-file"));
        assert_eq!(cfg.resolve_account_id(&record).unwrap(), "from-env");
    }

    #[test]
    fn test_account_id_falls_back_to_record() {
        let cfg = test_config(None);
        let record = record_with_account(Some("from-file"));
        assert_eq!(cfg.resolve_account_id(&record).unwrap(), "from-file");
    }

    #[test]
    fn test_account_id_missing_everywhere() {
        let cfg = test_config(None);
        let record = record_with_account(None);
        let err = cfg.resolve_account_id(&record).unwrap_err();
        assert!(err.to_string().contains("BASECAMP_ACCOUNT_ID"));
    }
}
