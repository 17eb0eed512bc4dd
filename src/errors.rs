use serde_json::{json, Value};
use thiserror::Error;

/// The kind of remote resource an operation targets. Used to build the
/// not-found messages surfaced to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Project,
    TodoSet,
    TodoList,
    Todo,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ResourceKind::Project => "Project",
            ResourceKind::TodoSet => "To-do set",
            ResourceKind::TodoList => "To-do list",
            ResourceKind::Todo => "To-do",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or unparseable credentials, incomplete refresh parameters.
    /// Fatal to the current operation; never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The authorization server rejected the refresh exchange.
    #[error("token refresh failed ({status}): {body}")]
    AuthRefresh { status: u16, body: String },

    /// A single-resource request came back 404.
    #[error("{kind} with ID {id} not found{}", .bucket.map(|b| format!(" in bucket {b}")).unwrap_or_default())]
    NotFound {
        kind: ResourceKind,
        id: i64,
        bucket: Option<i64>,
    },

    /// Transport failure or non-2xx from the resource API.
    #[error("{message}")]
    Upstream {
        status: Option<u16>,
        message: String,
        body: Option<String>,
    },
}

impl Error {
    pub fn upstream_status(status: reqwest::StatusCode, body: String) -> Self {
        Error::Upstream {
            status: Some(status.as_u16()),
            message: format!("HTTP error: {status}"),
            body: if body.is_empty() { None } else { Some(body) },
        }
    }

    pub fn upstream_transport(context: &str, err: &reqwest::Error) -> Self {
        Error::Upstream {
            status: None,
            message: format!("{context}: {err}"),
            body: None,
        }
    }

    /// Convert to the uniform JSON error envelope returned across the
    /// tool boundary. `include_details` adds the upstream body under a
    /// `details` key where one is available (the mutate tools do this).
    pub fn envelope(&self, include_details: bool) -> Value {
        match self {
            Error::Upstream {
                body: Some(body), ..
            } if include_details => json!({
                "error": self.to_string(),
                "details": body,
            }),
            _ => json!({ "error": self.to_string() }),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_with_bucket() {
        let err = Error::NotFound {
            kind: ResourceKind::Todo,
            id: 999,
            bucket: Some(1),
        };
        assert_eq!(err.to_string(), "To-do with ID 999 not found in bucket 1");
    }

    #[test]
    fn test_not_found_message_without_bucket() {
        let err = Error::NotFound {
            kind: ResourceKind::Project,
            id: 42,
            bucket: None,
        };
        assert_eq!(err.to_string(), "Project with ID 42 not found");
    }

    #[test]
    fn test_not_found_messages_per_kind() {
        let set = Error::NotFound {
            kind: ResourceKind::TodoSet,
            id: 7,
            bucket: Some(3),
        };
        assert_eq!(set.to_string(), "To-do set with ID 7 not found in bucket 3");

        let list = Error::NotFound {
            kind: ResourceKind::TodoList,
            id: 8,
            bucket: Some(3),
        };
        assert_eq!(list.to_string(), "To-do list with ID 8 not found in bucket 3");
    }

    #[test]
    fn test_envelope_plain() {
        let err = Error::Configuration("no token".into());
        let env = err.envelope(false);
        assert_eq!(env["error"], "configuration error: no token");
        assert!(env.get("details").is_none());
    }

    #[test]
    fn test_envelope_with_details() {
        let err = Error::Upstream {
            status: Some(422),
            message: "HTTP error: 422 Unprocessable Entity".into(),
            body: Some(r#"{"error":"content is required"}"#.into()),
        };
        let env = err.envelope(true);
        assert_eq!(env["error"], "HTTP error: 422 Unprocessable Entity");
        assert_eq!(env["details"], r#"{"error":"content is required"}"#);
    }

    #[test]
    fn test_envelope_details_suppressed_for_read_ops() {
        let err = Error::Upstream {
            status: Some(500),
            message: "HTTP error: 500 Internal Server Error".into(),
            body: Some("boom".into()),
        };
        let env = err.envelope(false);
        assert!(env.get("details").is_none());
    }

    #[test]
    fn test_auth_refresh_carries_status_and_body() {
        let err = Error::AuthRefresh {
            status: 401,
            body: "invalid refresh token".into(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("invalid refresh token"));
    }
}
