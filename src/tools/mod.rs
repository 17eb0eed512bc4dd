//! MCP tool surface for the Basecamp operations.
//!
//! Every tool returns a JSON string. Failures never propagate across
//! the tool boundary: each operation's error is converted to a
//! `{"error": ...}` envelope (with a `details` key carrying the
//! upstream body on the mutate tools) and returned as a successful tool
//! result, so a misbehaving upstream degrades to readable output for
//! the agent instead of a protocol failure.

use std::sync::Arc;

use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::tool;
use rmcp::Error as McpError;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::basecamp::ops::{BasecampApi, TodoFields};
use crate::errors::Error;

/// Instructions shown to agents using this server.
const INSTRUCTIONS: &str = r#"Basecamp project-management server: projects, to-do sets, to-do lists, and to-dos.

List tools fetch every page of results, not just the first 15. Projects and to-dos are ordered most recent first.

To find the to-do set for a project: call get_project, look in the 'dock' array for the todoset tool, and take the id from its url. To-do lists live under a to-do set; to-dos live under a to-do list. The bucket_id parameter is always the project id.

update_todo performs a full replace: pass ALL existing field values in addition to the ones you are changing, because any field you omit is cleared. Fetch the to-do with get_todo first and resend its current values alongside your changes."#;

// ── Tool inputs ────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListProjectsInput {
    /// Optional status filter: "archived" or "trashed". Active projects
    /// are returned when unset.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetProjectInput {
    /// The ID of the project to retrieve.
    pub project_id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTodosetInput {
    /// The project/bucket ID (same as project_id).
    pub bucket_id: i64,
    /// The ID of the to-do set to retrieve.
    pub todoset_id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTodolistsInput {
    /// The project/bucket ID (same as project_id).
    pub bucket_id: i64,
    /// The ID of the to-do set containing the lists.
    pub todoset_id: i64,
    /// Optional status filter: "archived" or "trashed".
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTodolistInput {
    /// The project/bucket ID (same as project_id).
    pub bucket_id: i64,
    /// The ID of the to-do list to retrieve.
    pub todolist_id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTodosInput {
    /// The project/bucket ID (same as project_id).
    pub bucket_id: i64,
    /// The ID of the to-do list containing the to-dos.
    pub todolist_id: i64,
    /// Optional status filter: "archived" or "trashed".
    pub status: Option<String>,
    /// Set true to retrieve only completed to-dos. Unset returns
    /// pending to-dos.
    pub completed: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetTodoInput {
    /// The project/bucket ID (same as project_id).
    pub bucket_id: i64,
    /// The ID of the to-do to retrieve.
    pub todo_id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateTodoInput {
    /// The project/bucket ID (same as project_id).
    pub bucket_id: i64,
    /// The ID of the to-do list to add the to-do to.
    pub todolist_id: i64,
    /// The to-do task description (required).
    pub content: String,
    /// Optional rich HTML content for a detailed description.
    pub description: Option<String>,
    /// Optional person IDs to assign the to-do to.
    pub assignee_ids: Option<Vec<i64>>,
    /// Optional person IDs to notify on completion.
    pub completion_subscriber_ids: Option<Vec<i64>>,
    /// Send notifications to assignees.
    pub notify: Option<bool>,
    /// Optional due date in YYYY-MM-DD format.
    pub due_on: Option<String>,
    /// Optional start date in YYYY-MM-DD format.
    pub starts_on: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateTodoInput {
    /// The project/bucket ID (same as project_id).
    pub bucket_id: i64,
    /// The ID of the to-do to update.
    pub todo_id: i64,
    /// The to-do task description (required, cannot be blank).
    pub content: String,
    /// Rich HTML description. Omitting this clears the field.
    pub description: Option<String>,
    /// Person IDs to assign. Omitting this clears the assignments.
    pub assignee_ids: Option<Vec<i64>>,
    /// Person IDs to notify on completion. Omitting this clears them.
    pub completion_subscriber_ids: Option<Vec<i64>>,
    /// Send notifications to assignees.
    pub notify: Option<bool>,
    /// Due date in YYYY-MM-DD format. Omitting this clears it.
    pub due_on: Option<String>,
    /// Start date in YYYY-MM-DD format. Omitting this clears it.
    pub starts_on: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompleteTodoInput {
    /// The project/bucket ID (same as project_id).
    pub bucket_id: i64,
    /// The ID of the to-do to complete.
    pub todo_id: i64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UncompleteTodoInput {
    /// The project/bucket ID (same as project_id).
    pub bucket_id: i64,
    /// The ID of the to-do to reopen.
    pub todo_id: i64,
}

impl CreateTodoInput {
    fn fields(&self) -> TodoFields {
        TodoFields {
            content: self.content.clone(),
            description: self.description.clone(),
            assignee_ids: self.assignee_ids.clone(),
            completion_subscriber_ids: self.completion_subscriber_ids.clone(),
            notify: self.notify,
            due_on: self.due_on.clone(),
            starts_on: self.starts_on.clone(),
        }
    }
}

impl UpdateTodoInput {
    fn fields(&self) -> TodoFields {
        TodoFields {
            content: self.content.clone(),
            description: self.description.clone(),
            assignee_ids: self.assignee_ids.clone(),
            completion_subscriber_ids: self.completion_subscriber_ids.clone(),
            notify: self.notify,
            due_on: self.due_on.clone(),
            starts_on: self.starts_on.clone(),
        }
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Clone)]
pub struct BasecampTools {
    api: Arc<BasecampApi>,
}

impl BasecampTools {
    pub fn new(api: BasecampApi) -> Self {
        Self { api: Arc::new(api) }
    }
}

/// Serialize an operation outcome as the tool's JSON text output.
/// Errors become the uniform error envelope instead of propagating.
fn reply(result: Result<Value, Error>, include_details: bool) -> CallToolResult {
    let value = match result {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "tool operation failed");
            err.envelope(include_details)
        }
    };
    let text = serde_json::to_string_pretty(&value)
        .unwrap_or_else(|_| r#"{"error": "failed to serialize response"}"#.to_string());
    CallToolResult::success(vec![Content::text(text)])
}

#[tool(tool_box)]
impl BasecampTools {
    #[tool(
        description = "List all projects visible to the current user, fetching every page. Optional status filter: \"archived\" or \"trashed\"; active projects are returned by default, most recently created first"
    )]
    async fn list_projects(
        &self,
        #[tool(aggr)] input: ListProjectsInput,
    ) -> Result<CallToolResult, McpError> {
        let result = self.api.list_projects(input.status.as_deref()).await;
        Ok(reply(result, false))
    }

    #[tool(
        description = "Get detailed information for a project, including its dock of enabled tools (message board, to-dos, docs, chat) and their endpoints"
    )]
    async fn get_project(
        &self,
        #[tool(aggr)] input: GetProjectInput,
    ) -> Result<CallToolResult, McpError> {
        let result = self.api.get_project(input.project_id).await;
        Ok(reply(result, false))
    }

    #[tool(
        description = "Get a to-do set from a project. To-do sets are the container all of a project's to-do lists hang off of; find the todoset_id in the project's dock via get_project"
    )]
    async fn get_todoset(
        &self,
        #[tool(aggr)] input: GetTodosetInput,
    ) -> Result<CallToolResult, McpError> {
        let result = self.api.get_todoset(input.bucket_id, input.todoset_id).await;
        Ok(reply(result, false))
    }

    #[tool(
        description = "Get all to-do lists from a to-do set, fetching every page. Optional status filter: \"archived\" or \"trashed\""
    )]
    async fn get_todolists(
        &self,
        #[tool(aggr)] input: GetTodolistsInput,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .api
            .get_todolists(input.bucket_id, input.todoset_id, input.status.as_deref())
            .await;
        Ok(reply(result, false))
    }

    #[tool(description = "Get a single to-do list with complete details")]
    async fn get_todolist(
        &self,
        #[tool(aggr)] input: GetTodolistInput,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .api
            .get_todolist(input.bucket_id, input.todolist_id)
            .await;
        Ok(reply(result, false))
    }

    #[tool(
        description = "Get all to-dos from a to-do list, fetching every page. Returns pending to-dos by default; set completed=true for finished ones, or filter by status \"archived\"/\"trashed\""
    )]
    async fn get_todos(
        &self,
        #[tool(aggr)] input: GetTodosInput,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .api
            .get_todos(
                input.bucket_id,
                input.todolist_id,
                input.status.as_deref(),
                input.completed,
            )
            .await;
        Ok(reply(result, false))
    }

    #[tool(
        description = "Get a single to-do with complete details: assignment, completion status, scheduling, and URLs for modification"
    )]
    async fn get_todo(
        &self,
        #[tool(aggr)] input: GetTodoInput,
    ) -> Result<CallToolResult, McpError> {
        let result = self.api.get_todo(input.bucket_id, input.todo_id).await;
        Ok(reply(result, false))
    }

    #[tool(description = "Create a new to-do in a to-do list")]
    async fn create_todo(
        &self,
        #[tool(aggr)] input: CreateTodoInput,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .api
            .create_todo(input.bucket_id, input.todolist_id, &input.fields())
            .await;
        Ok(reply(result, true))
    }

    #[tool(
        description = "Update an existing to-do. IMPORTANT: this is a full replace, so pass ALL existing parameters in addition to those being updated, because omitted parameters are cleared. Fetch current values with get_todo first"
    )]
    async fn update_todo(
        &self,
        #[tool(aggr)] input: UpdateTodoInput,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .api
            .update_todo(input.bucket_id, input.todo_id, &input.fields())
            .await;
        Ok(reply(result, true))
    }

    #[tool(
        description = "Mark a to-do as completed, recording who completed it and notifying subscribers"
    )]
    async fn complete_todo(
        &self,
        #[tool(aggr)] input: CompleteTodoInput,
    ) -> Result<CallToolResult, McpError> {
        let result = self.api.complete_todo(input.bucket_id, input.todo_id).await;
        Ok(reply(result, true))
    }

    #[tool(description = "Mark a to-do as uncompleted (reopen it)")]
    async fn uncomplete_todo(
        &self,
        #[tool(aggr)] input: UncompleteTodoInput,
    ) -> Result<CallToolResult, McpError> {
        let result = self
            .api
            .uncomplete_todo(input.bucket_id, input.todo_id)
            .await;
        Ok(reply(result, true))
    }
}

#[tool(tool_box)]
impl rmcp::ServerHandler for BasecampTools {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "basecamp-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
