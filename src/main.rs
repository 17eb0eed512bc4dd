use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rmcp::{transport::io::stdio, ServiceExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use basecamp_mcp::auth::store::{CredentialSource, CredentialStore};
use basecamp_mcp::auth::token::{OauthParams, TokenManager};
use basecamp_mcp::basecamp::client::ApiClient;
use basecamp_mcp::basecamp::ops::BasecampApi;
use basecamp_mcp::cli::{self, Cli, Commands, TokenCommands};
use basecamp_mcp::config::{self, Config};
use basecamp_mcp::tools::BasecampTools;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The MCP transport owns stdout; all logging goes to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "basecamp_mcp=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = config::load()?;
    let args = Cli::parse();

    match args.command {
        None | Some(Commands::Serve) => run_server(cfg).await,
        Some(Commands::Token { command }) => handle_token_command(&cfg, command).await,
    }
}

fn build_manager(cfg: &Config) -> TokenManager {
    let store = CredentialStore::new(cfg.token_file.clone());
    let oauth = OauthParams {
        client_id: cfg.client_id.clone(),
        client_secret: cfg.client_secret.clone(),
        redirect_uri: cfg.redirect_uri.clone(),
    };
    TokenManager::new(store, oauth, cfg.auth_token_url.clone())
}

async fn run_server(cfg: Config) -> anyhow::Result<()> {
    let manager = Arc::new(build_manager(&cfg));

    let record = manager
        .store()
        .load()
        .await
        .context("failed to resolve Basecamp credentials")?;
    let account_id = cfg.resolve_account_id(&record)?;
    let base_url = cfg.api_base_url(&account_id);

    tracing::info!(account = %account_id, base_url = %base_url, "starting Basecamp MCP server");

    let client = ApiClient::new(manager, cfg.user_agent.clone(), cfg.max_pages);
    let api = BasecampApi::new(client, base_url);
    let tools = BasecampTools::new(api);

    let service = tools.serve(stdio()).await?;
    tracing::info!("Basecamp MCP server running");

    service.waiting().await?;
    tracing::info!("Basecamp MCP server stopped");

    Ok(())
}

async fn handle_token_command(cfg: &Config, command: TokenCommands) -> anyhow::Result<()> {
    let manager = build_manager(cfg);

    match command {
        TokenCommands::Show => {
            let record = manager.store().load().await?;
            println!("source:        {}", record.source);
            println!("access token:  {}", cli::redact(record.access_token.as_deref()));
            println!("refresh token: {}", cli::redact(record.refresh_token.as_deref()));
            println!(
                "expires at:    {}",
                record
                    .expires_at
                    .as_deref()
                    .unwrap_or("(none; treated as non-expiring)")
            );
            println!(
                "account id:    {}",
                record.account_id.as_deref().unwrap_or("(none)")
            );
            if let Some(updated) = &record.updated_at {
                println!("updated at:    {updated}");
            }
        }
        TokenCommands::Refresh => {
            let record = manager.force_refresh().await?;
            println!(
                "refresh succeeded; new expiry: {}",
                record.expires_at.as_deref().unwrap_or("(none)")
            );
            if record.source == CredentialSource::Environment {
                println!(
                    "note: credentials came from the environment; \
                     the refreshed token was not persisted"
                );
            }
        }
    }

    Ok(())
}
