//! Resource operations: one REST call per logical action.
//!
//! Each operation interpolates a bucket (project) id and/or nested
//! resource id into a URL under the account base, optionally appends
//! status/completion filters, and either walks every page (list
//! endpoints) or issues a single request (get/mutate endpoints).
//! Response bodies are opaque JSON passed through unmodified except for
//! aggregation across pages and the envelope fields added here.

use reqwest::{Method, StatusCode};
use serde_json::{json, Map, Value};
use url::Url;

use super::client::ApiClient;
use crate::errors::{Error, ResourceKind};

/// Optional and required fields of a to-do, shared by create and update.
///
/// The two operations serialize these differently on purpose. Create
/// skips fields the caller left absent or empty; the remote treats a
/// missing field as "leave absent". Update sends everything the caller
/// supplied, empty or not, and the remote performs a full replace:
/// a field the caller does not resend is cleared upstream. Callers must
/// fetch current values first and resend them alongside their changes.
#[derive(Debug, Clone, Default)]
pub struct TodoFields {
    pub content: String,
    pub description: Option<String>,
    pub assignee_ids: Option<Vec<i64>>,
    pub completion_subscriber_ids: Option<Vec<i64>>,
    pub notify: Option<bool>,
    pub due_on: Option<String>,
    pub starts_on: Option<String>,
}

impl TodoFields {
    /// Request body for POST (create). Absent and empty optionals are
    /// not sent.
    pub fn create_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("content".into(), json!(self.content));

        if let Some(d) = self.description.as_deref().filter(|s| !s.is_empty()) {
            payload.insert("description".into(), json!(d));
        }
        if let Some(ids) = self.assignee_ids.as_ref().filter(|v| !v.is_empty()) {
            payload.insert("assignee_ids".into(), json!(ids));
        }
        if let Some(ids) = self
            .completion_subscriber_ids
            .as_ref()
            .filter(|v| !v.is_empty())
        {
            payload.insert("completion_subscriber_ids".into(), json!(ids));
        }
        if let Some(notify) = self.notify {
            payload.insert("notify".into(), json!(notify));
        }
        if let Some(d) = self.due_on.as_deref().filter(|s| !s.is_empty()) {
            payload.insert("due_on".into(), json!(d));
        }
        if let Some(s) = self.starts_on.as_deref().filter(|s| !s.is_empty()) {
            payload.insert("starts_on".into(), json!(s));
        }

        Value::Object(payload)
    }

    /// Request body for PUT (update). Everything the caller supplied is
    /// sent verbatim, empty values included; only absent fields are
    /// omitted (and thereby cleared by the remote's full replace).
    pub fn replace_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("content".into(), json!(self.content));

        if let Some(d) = &self.description {
            payload.insert("description".into(), json!(d));
        }
        if let Some(ids) = &self.assignee_ids {
            payload.insert("assignee_ids".into(), json!(ids));
        }
        if let Some(ids) = &self.completion_subscriber_ids {
            payload.insert("completion_subscriber_ids".into(), json!(ids));
        }
        if let Some(notify) = self.notify {
            payload.insert("notify".into(), json!(notify));
        }
        if let Some(d) = &self.due_on {
            payload.insert("due_on".into(), json!(d));
        }
        if let Some(s) = &self.starts_on {
            payload.insert("starts_on".into(), json!(s));
        }

        Value::Object(payload)
    }
}

pub struct BasecampApi {
    client: ApiClient,
    /// Per-account base URL, fixed at construction.
    base_url: String,
}

impl BasecampApi {
    pub fn new(client: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    // ── List operations (paginated) ────────────────────────────

    pub async fn list_projects(&self, status: Option<&str>) -> Result<Value, Error> {
        let url = with_status_query(self.url("projects.json"), status, None)?;
        let projects = self.client.fetch_all(&url).await?;
        Ok(projects_envelope(status, projects))
    }

    pub async fn get_todolists(
        &self,
        bucket_id: i64,
        todoset_id: i64,
        status: Option<&str>,
    ) -> Result<Value, Error> {
        let path = format!("buckets/{bucket_id}/todosets/{todoset_id}/todolists.json");
        let url = with_status_query(self.url(&path), status, None)?;
        let todolists = self.client.fetch_all(&url).await?;
        Ok(todolists_envelope(bucket_id, todoset_id, status, todolists))
    }

    pub async fn get_todos(
        &self,
        bucket_id: i64,
        todolist_id: i64,
        status: Option<&str>,
        completed: Option<bool>,
    ) -> Result<Value, Error> {
        let path = format!("buckets/{bucket_id}/todolists/{todolist_id}/todos.json");
        let url = with_status_query(self.url(&path), status, completed)?;
        let todos = self.client.fetch_all(&url).await?;
        Ok(todos_envelope(bucket_id, todolist_id, status, completed, todos))
    }

    // ── Single-resource reads ──────────────────────────────────

    pub async fn get_project(&self, project_id: i64) -> Result<Value, Error> {
        let url = self.url(&format!("projects/{project_id}.json"));
        self.get_one(&url, ResourceKind::Project, project_id, None)
            .await
    }

    pub async fn get_todoset(&self, bucket_id: i64, todoset_id: i64) -> Result<Value, Error> {
        let url = self.url(&format!("buckets/{bucket_id}/todosets/{todoset_id}.json"));
        self.get_one(&url, ResourceKind::TodoSet, todoset_id, Some(bucket_id))
            .await
    }

    pub async fn get_todolist(&self, bucket_id: i64, todolist_id: i64) -> Result<Value, Error> {
        let url = self.url(&format!("buckets/{bucket_id}/todolists/{todolist_id}.json"));
        self.get_one(&url, ResourceKind::TodoList, todolist_id, Some(bucket_id))
            .await
    }

    pub async fn get_todo(&self, bucket_id: i64, todo_id: i64) -> Result<Value, Error> {
        let url = self.url(&format!("buckets/{bucket_id}/todos/{todo_id}.json"));
        self.get_one(&url, ResourceKind::Todo, todo_id, Some(bucket_id))
            .await
    }

    // ── Mutations ──────────────────────────────────────────────

    pub async fn create_todo(
        &self,
        bucket_id: i64,
        todolist_id: i64,
        fields: &TodoFields,
    ) -> Result<Value, Error> {
        let url = self.url(&format!(
            "buckets/{bucket_id}/todolists/{todolist_id}/todos.json"
        ));
        let payload = fields.create_payload();
        let resp = self.client.send(Method::POST, &url, Some(&payload)).await?;
        // A 404 here means the target list, not the new to-do.
        let resp =
            check_status(resp, ResourceKind::TodoList, todolist_id, Some(bucket_id)).await?;
        let todo = parse_json(resp).await?;
        Ok(json!({ "status": "created", "todo": todo }))
    }

    pub async fn update_todo(
        &self,
        bucket_id: i64,
        todo_id: i64,
        fields: &TodoFields,
    ) -> Result<Value, Error> {
        let url = self.url(&format!("buckets/{bucket_id}/todos/{todo_id}.json"));
        let payload = fields.replace_payload();
        let resp = self.client.send(Method::PUT, &url, Some(&payload)).await?;
        let resp = check_status(resp, ResourceKind::Todo, todo_id, Some(bucket_id)).await?;
        let todo = parse_json(resp).await?;
        Ok(json!({ "status": "updated", "todo": todo }))
    }

    pub async fn complete_todo(&self, bucket_id: i64, todo_id: i64) -> Result<Value, Error> {
        let url = self.url(&format!("buckets/{bucket_id}/todos/{todo_id}/completion.json"));
        let resp = self.client.send(Method::POST, &url, None).await?;
        check_status(resp, ResourceKind::Todo, todo_id, Some(bucket_id)).await?;
        Ok(json!({
            "status": "completed",
            "message": format!("To-do {todo_id} has been marked as complete"),
        }))
    }

    pub async fn uncomplete_todo(&self, bucket_id: i64, todo_id: i64) -> Result<Value, Error> {
        let url = self.url(&format!("buckets/{bucket_id}/todos/{todo_id}/completion.json"));
        let resp = self.client.send(Method::DELETE, &url, None).await?;
        check_status(resp, ResourceKind::Todo, todo_id, Some(bucket_id)).await?;
        Ok(json!({
            "status": "uncompleted",
            "message": format!("To-do {todo_id} has been marked as incomplete"),
        }))
    }

    async fn get_one(
        &self,
        url: &str,
        kind: ResourceKind,
        id: i64,
        bucket: Option<i64>,
    ) -> Result<Value, Error> {
        let resp = self.client.send(Method::GET, url, None).await?;
        let resp = check_status(resp, kind, id, bucket).await?;
        parse_json(resp).await
    }
}

/// Map a 404 to the dedicated not-found condition for `kind`/`id`, any
/// other non-2xx to a generic upstream error carrying status and body.
async fn check_status(
    resp: reqwest::Response,
    kind: ResourceKind,
    id: i64,
    bucket: Option<i64>,
) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(Error::NotFound { kind, id, bucket });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::upstream_status(status, body));
    }
    Ok(resp)
}

async fn parse_json(resp: reqwest::Response) -> Result<Value, Error> {
    resp.json()
        .await
        .map_err(|e| Error::upstream_transport("invalid JSON from Basecamp", &e))
}

fn with_status_query(
    url: String,
    status: Option<&str>,
    completed: Option<bool>,
) -> Result<String, Error> {
    if status.is_none() && completed.is_none() {
        return Ok(url);
    }
    let mut parsed =
        Url::parse(&url).map_err(|e| Error::Configuration(format!("invalid API URL {url:?}: {e}")))?;
    {
        let mut pairs = parsed.query_pairs_mut();
        if let Some(status) = status {
            pairs.append_pair("status", status);
        }
        if let Some(completed) = completed {
            pairs.append_pair("completed", if completed { "true" } else { "false" });
        }
    }
    Ok(parsed.into())
}

// ── Envelopes ──────────────────────────────────────────────────

fn projects_envelope(status: Option<&str>, projects: Vec<Value>) -> Value {
    json!({
        "total_projects": projects.len(),
        "status_filter": status.unwrap_or("active"),
        "projects": projects,
    })
}

fn todolists_envelope(
    bucket_id: i64,
    todoset_id: i64,
    status: Option<&str>,
    todolists: Vec<Value>,
) -> Value {
    json!({
        "total_todolists": todolists.len(),
        "bucket_id": bucket_id,
        "todoset_id": todoset_id,
        "status_filter": status.unwrap_or("active"),
        "todolists": todolists,
    })
}

fn todos_envelope(
    bucket_id: i64,
    todolist_id: i64,
    status: Option<&str>,
    completed: Option<bool>,
    todos: Vec<Value>,
) -> Value {
    json!({
        "total_todos": todos.len(),
        "bucket_id": bucket_id,
        "todolist_id": todolist_id,
        "status_filter": status.unwrap_or("active"),
        "completed_filter": completed.map(Value::Bool).unwrap_or_else(|| json!("all pending")),
        "todos": todos,
    })
}

// ── Tests ──────────────────────────────────────────────────────
