//! Counsel command-line client
//!
//! Composition root for the gateway:
//! 1. Loads configuration (TOML file plus env overrides)
//! 2. Opens the session store and restores the token pair
//! 3. Builds one `GatewayClient` and hands it to the account API
//! 4. Runs a single command and prints its JSON result

mod command;
mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use counsel_account::AccountApi;
use counsel_auth::{FileStore, SessionStore};
use counsel_gateway::GatewayClient;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::command::{Command, USAGE, split_config_flag};
use crate::config::Config;

async fn open_store(path: Option<&Path>) -> Result<SessionStore> {
    let Some(path) = path else {
        info!("using in-memory session store");
        return Ok(SessionStore::in_memory());
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = FileStore::open(path.to_path_buf())
        .await
        .with_context(|| format!("failed to open session store {}", path.display()))?;
    info!(path = %path.display(), "session store opened");
    Ok(SessionStore::new(Arc::new(store)))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{USAGE}");
        return Ok(());
    }
    let (cli_config_path, rest) = split_config_flag(&args);
    let command = Command::parse(&rest)?;

    let location = Config::resolve_path(cli_config_path.as_deref());
    info!(path = %location.path.display(), explicit = location.explicit, "loading configuration");
    let config = Config::load(&location)
        .with_context(|| format!("failed to load config from {}", location.path.display()))?;
    info!(
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        refresh_timeout_secs = config.api.refresh_timeout_secs,
        "configuration loaded"
    );

    let store = open_store(config.session_path()).await?;
    let gateway = GatewayClient::new(config.gateway(), store)
        .await
        .context("failed to build gateway client")?;
    let account = AccountApi::new(gateway);

    match command.run(&account).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            if let Some(gateway_error) = e.downcast_ref::<counsel_gateway::Error>()
                && gateway_error.is_session_ended()
            {
                error!(error = %gateway_error, "session ended, run `counsel login` again");
            }
            Err(e)
        }
    }
}
