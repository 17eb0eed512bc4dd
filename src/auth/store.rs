//! Credential resolution and persistence.
//!
//! Two sources are consulted in a fixed order:
//! 1. Environment variables (BASECAMP_ACCESS_TOKEN and companions)
//! 2. The token file (JSON, single top-level `basecamp` key)
//!
//! The first source that yields a record wins: when the environment
//! supplies an access token, the file is never read. Sources are
//! modeled as an ordered strategy list so a third backend (e.g. a
//! secrets manager) slots in without touching the resolution logic.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Which source produced a credential record. Determines persistence:
/// refreshed tokens are written back only for file-sourced records.
/// Never serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    #[default]
    File,
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialSource::Environment => f.write_str("environment"),
            CredentialSource::File => f.write_str("file"),
        }
    }
}

/// OAuth token material as resolved from one source.
///
/// `access_token` may be absent when the source record is incomplete;
/// the token lifecycle layer rejects such records with a configuration
/// error rather than this layer guessing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// RFC-3339 expiry timestamp. Absent means non-expiring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Stamped on successful refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(skip)]
    pub source: CredentialSource,
}

/// On-disk shape: a single top-level key wrapping the record.
#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    basecamp: CredentialRecord,
}

/// A single credential source strategy.
///
/// `Ok(None)` means "this source has nothing" and resolution moves on;
/// `Err` means the source is present but broken and resolution stops.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self) -> Result<Option<CredentialRecord>, Error>;
}

/// Reads BASECAMP_ACCESS_TOKEN and companion variables.
pub struct EnvProvider;

#[async_trait]
impl CredentialProvider for EnvProvider {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn load(&self) -> Result<Option<CredentialRecord>, Error> {
        let access_token = match std::env::var("BASECAMP_ACCESS_TOKEN") {
            Ok(v) if !v.is_empty() => v,
            _ => return Ok(None),
        };

        let nonempty = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Ok(Some(CredentialRecord {
            access_token: Some(access_token),
            refresh_token: nonempty("BASECAMP_REFRESH_TOKEN"),
            expires_at: nonempty("BASECAMP_TOKEN_EXPIRES_AT"),
            account_id: nonempty("BASECAMP_ACCOUNT_ID"),
            updated_at: None,
            source: CredentialSource::Environment,
        }))
    }
}

/// Reads the JSON token file.
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialProvider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn load(&self) -> Result<Option<CredentialRecord>, Error> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Configuration(format!(
                    "failed to read token file at {}: {e}",
                    self.path.display()
                )))
            }
        };

        let parsed: TokenFile = serde_json::from_str(&raw).map_err(|e| {
            Error::Configuration(format!(
                "invalid JSON in token file at {}: {e}",
                self.path.display()
            ))
        })?;

        let mut record = parsed.basecamp;
        record.source = CredentialSource::File;
        Ok(Some(record))
    }
}

/// Resolves and persists OAuth token material.
pub struct CredentialStore {
    providers: Vec<Box<dyn CredentialProvider>>,
    token_file: PathBuf,
}

impl CredentialStore {
    /// Standard resolution order: environment first, token file second.
    pub fn new(token_file: impl Into<PathBuf>) -> Self {
        let token_file = token_file.into();
        Self {
            providers: vec![
                Box::new(EnvProvider),
                Box::new(FileProvider::new(token_file.clone())),
            ],
            token_file,
        }
    }

    /// Custom provider list. Persistence still targets `token_file`.
    pub fn with_providers(
        providers: Vec<Box<dyn CredentialProvider>>,
        token_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            providers,
            token_file: token_file.into(),
        }
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    /// Walk the sources in order; the first one with a record wins.
    pub async fn load(&self) -> Result<CredentialRecord, Error> {
        for provider in &self.providers {
            if let Some(record) = provider.load().await? {
                tracing::debug!(source = provider.name(), "credentials resolved");
                return Ok(record);
            }
        }
        Err(Error::Configuration(format!(
            "no credentials found: set BASECAMP_ACCESS_TOKEN or provide a token file at {}",
            self.token_file.display()
        )))
    }

    /// Persist a refreshed record.
    ///
    /// Environment-sourced records are not written anywhere: the caller
    /// keeps a usable in-memory token for the rest of the process, and a
    /// restart falls back to the stale environment value. File-sourced
    /// records are written back, and a write failure propagates because
    /// durability was expected.
    pub async fn save(&self, record: &CredentialRecord) -> Result<(), Error> {
        if record.source == CredentialSource::Environment {
            tracing::debug!("environment-sourced credentials; skipping persistence");
            return Ok(());
        }

        let wrapped = TokenFile {
            basecamp: record.clone(),
        };
        let body = serde_json::to_string_pretty(&wrapped).map_err(|e| {
            Error::Configuration(format!("failed to serialize token file: {e}"))
        })?;

        tokio::fs::write(&self.token_file, body).await.map_err(|e| {
            Error::Configuration(format!(
                "failed to write token file at {}: {e}",
                self.token_file.display()
            ))
        })?;

        tracing::info!(path = %self.token_file.display(), "token file updated");
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn file_only_store(dir: &tempfile::TempDir) -> CredentialStore {
        let path = dir.path().join("token.json");
        CredentialStore::with_providers(
            vec![Box::new(FileProvider::new(path.clone()))],
            path,
        )
    }

    fn sample_record() -> CredentialRecord {
        CredentialRecord {
            access_token: Some("abc123".into()),
            refresh_token: Some("refresh456".into()),
            expires_at: Some("2030-01-01T00:00:00Z".into()),
            account_id: Some("99999".into()),
            updated_at: None,
            source: CredentialSource::File,
        }
    }

    /// Provider that always yields a record and counts invocations.
    struct FixedProvider {
        record: CredentialRecord,
        calls: Arc<AtomicUsize>,
    }

    /// Provider that must never be consulted.
    struct PoisonProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CredentialProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn load(&self) -> Result<Option<CredentialRecord>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.record.clone()))
        }
    }

    #[async_trait]
    impl CredentialProvider for PoisonProvider {
        fn name(&self) -> &'static str {
            "poison"
        }
        async fn load(&self) -> Result<Option<CredentialRecord>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(sample_record()))
        }
    }

    #[tokio::test]
    async fn test_first_source_wins_and_later_sources_untouched() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));

        let mut env_record = sample_record();
        env_record.source = CredentialSource::Environment;

        let store = CredentialStore::with_providers(
            vec![
                Box::new(FixedProvider {
                    record: env_record,
                    calls: first_calls.clone(),
                }),
                Box::new(PoisonProvider {
                    calls: second_calls.clone(),
                }),
            ],
            "unused.json",
        );

        let record = store.load().await.unwrap();
        assert_eq!(record.source, CredentialSource::Environment);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_only_store(&dir);

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("no credentials found"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_only_store(&dir);
        tokio::fs::write(store.token_file(), "{not json")
            .await
            .unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_only_store(&dir);

        store.save(&sample_record()).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.access_token.as_deref(), Some("abc123"));
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh456"));
        assert_eq!(loaded.account_id.as_deref(), Some("99999"));
        assert_eq!(loaded.source, CredentialSource::File);
    }

    #[tokio::test]
    async fn test_saved_file_has_wrapper_key_and_no_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_only_store(&dir);

        store.save(&sample_record()).await.unwrap();

        let raw = tokio::fs::read_to_string(store.token_file()).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("basecamp").is_some());
        assert!(value["basecamp"].get("source").is_none());
        assert_eq!(value["basecamp"]["access_token"], "abc123");
    }

    #[tokio::test]
    async fn test_save_is_noop_for_environment_source() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_only_store(&dir);

        let mut record = sample_record();
        record.source = CredentialSource::Environment;
        store.save(&record).await.unwrap();

        assert!(!store.token_file().exists());
    }

    #[tokio::test]
    async fn test_record_without_access_token_still_loads() {
        // An incomplete file record resolves; rejecting it is the token
        // lifecycle layer's job.
        let dir = tempfile::tempdir().unwrap();
        let store = file_only_store(&dir);
        tokio::fs::write(
            store.token_file(),
            r#"{"basecamp": {"account_id": "123"}}"#,
        )
        .await
        .unwrap();

        let record = store.load().await.unwrap();
        assert!(record.access_token.is_none());
        assert_eq!(record.account_id.as_deref(), Some("123"));
    }
}
