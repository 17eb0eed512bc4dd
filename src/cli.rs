use clap::{Parser, Subcommand};

/// Basecamp MCP Gateway — project-management tools for AI agents
#[derive(Parser)]
#[command(name = "basecamp-mcp", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP server on stdio (the default when no command is given)
    Serve,

    /// Inspect or refresh the stored OAuth credentials
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Show the resolved credential record with token values redacted
    Show,
    /// Force a refresh exchange and persist the result
    Refresh,
}

/// Shorten a secret for display: first characters only, never the whole
/// value.
pub fn redact(value: Option<&str>) -> String {
    match value {
        Some(v) if v.chars().count() > 8 => {
            let head: String = v.chars().take(8).collect();
            format!("{head}…")
        }
        Some(_) => "(set)".into(),
        None => "(not set)".into(),
    }
}

// ── Tests ──────────────────────────────────────────────────────
