//! Authenticated HTTP access to the Basecamp API.
//!
//! Two concerns live here:
//! - request construction: every outbound call carries a bearer token
//!   (resolved through the token lifecycle manager on every call, so
//!   headers are never stale), the configured User-Agent, and a JSON
//!   content type;
//! - pagination: `fetch_all` walks `Link: <...>; rel="next"` headers
//!   until the chain ends, concatenating page items in request order.
//!
//! No retry or backoff at this layer; transport failures surface to the
//! caller as-is.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, LINK, USER_AGENT};
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::auth::token::TokenManager;
use crate::errors::Error;

pub struct ApiClient {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    user_agent: String,
    max_pages: usize,
}

impl ApiClient {
    pub fn new(tokens: Arc<TokenManager>, user_agent: impl Into<String>, max_pages: usize) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            tokens,
            user_agent: user_agent.into(),
            max_pages,
        }
    }

    /// Build the header triple for one request. Invokes the token
    /// lifecycle manager every time, which may trigger a refresh.
    async fn headers(&self) -> Result<HeaderMap, Error> {
        let token = self.tokens.get_valid_access_token().await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                Error::Configuration("access token contains invalid header characters".into())
            })?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent).map_err(|_| {
                Error::Configuration("USER_AGENT contains invalid header characters".into())
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Issue one authenticated request. Status handling is the caller's
    /// concern; only transport failures are mapped here.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, Error> {
        let headers = self.headers().await?;
        let mut request = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| Error::upstream_transport("request to Basecamp failed", &e))
    }

    /// Fetch every page of a paginated endpoint, starting at `start_url`
    /// and following `rel="next"` links verbatim.
    ///
    /// Any failure aborts the whole fetch; pages already accumulated are
    /// discarded rather than returned partially. A misbehaving upstream
    /// that never stops producing `next` links is cut off after
    /// `max_pages` pages.
    pub async fn fetch_all(&self, start_url: &str) -> Result<Vec<Value>, Error> {
        let mut items = Vec::new();
        let mut current = start_url.to_string();
        let mut pages = 0usize;

        loop {
            pages += 1;
            if pages > self.max_pages {
                return Err(Error::Upstream {
                    status: None,
                    message: format!(
                        "pagination aborted after {} pages: upstream kept returning rel=\"next\" links",
                        self.max_pages
                    ),
                    body: None,
                });
            }

            let resp = self.send(Method::GET, &current, None).await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Upstream {
                    status: Some(status.as_u16()),
                    message: format!("Error fetching data from Basecamp: {status}"),
                    body: if body.is_empty() { None } else { Some(body) },
                });
            }

            let next = next_page_url(resp.headers());
            let page: Value = resp.json().await.map_err(|e| {
                Error::upstream_transport("invalid JSON from Basecamp", &e)
            })?;

            match page {
                Value::Array(elements) => items.extend(elements),
                single => items.push(single),
            }

            match next {
                Some(url) => {
                    tracing::debug!(page = pages, next = %url, "following pagination link");
                    current = url;
                }
                None => break,
            }
        }

        Ok(items)
    }
}

/// Extract the next-page URL from a response's link header.
///
/// Only the first comma-separated entry is considered, and only when it
/// carries a `rel="next"` marker; the URL between the angle brackets is
/// used verbatim. Anything else (no header, `rel="first"`, malformed
/// brackets, a non-absolute URL) terminates pagination.
pub(crate) fn next_page_url(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(LINK)?.to_str().ok()?;
    let first_entry = raw.split(',').next()?;
    let (target, params) = first_entry.split_once(';')?;
    if !params.contains(r#"rel="next""#) {
        return None;
    }
    let url = target.trim().strip_prefix('<')?.strip_suffix('>')?;
    Url::parse(url).ok()?;
    Some(url.to_string())
}

// ── Tests ──────────────────────────────────────────────────────
