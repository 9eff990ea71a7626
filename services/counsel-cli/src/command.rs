//! Command-line commands
//!
//! Each command runs against the account API (and through it the gateway)
//! and produces a JSON value for stdout.

use anyhow::{Context, Result, bail};
use counsel_account::{AccountApi, LoginRequest};
use counsel_gateway::RequestDescriptor;
use serde_json::{Value, json};

pub const USAGE: &str = "\
usage: counsel [--config <path>] <command>

commands:
  login <email>              sign in (password read from COUNSEL_PASSWORD)
  logout                     sign out and forget the session
  whoami                     fetch the signed-in user's profile
  status                     show local session state
  refresh                    refresh the access token now
  get <path> [key=value...]  GET an API path with optional query parameters
  post <path> [json]         POST a JSON body
  patch <path> [json]        PATCH a JSON body
  delete <path>              DELETE an API path";

#[derive(Debug, PartialEq)]
pub enum Command {
    Login { email: String },
    Logout,
    Whoami,
    Status,
    Refresh,
    Get { path: String, query: Vec<(String, String)> },
    Post { path: String, body: Value },
    Patch { path: String, body: Value },
    Delete { path: String },
}

/// Split `--config <path>` out of the raw arguments (program name excluded).
pub fn split_config_flag(args: &[String]) -> (Option<String>, Vec<String>) {
    let mut config = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config = iter.next().cloned();
        } else {
            rest.push(arg.clone());
        }
    }
    (config, rest)
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some((name, rest)) = args.split_first() else {
            bail!("missing command\n\n{USAGE}");
        };
        let path = || -> Result<String> {
            rest.first()
                .cloned()
                .with_context(|| format!("{name} needs a path\n\n{USAGE}"))
        };

        let command = match name.as_str() {
            "login" => Command::Login {
                email: rest
                    .first()
                    .cloned()
                    .with_context(|| format!("login needs an email\n\n{USAGE}"))?,
            },
            "logout" => Command::Logout,
            "whoami" => Command::Whoami,
            "status" => Command::Status,
            "refresh" => Command::Refresh,
            "get" => Command::Get {
                path: path()?,
                query: rest[1..]
                    .iter()
                    .map(|pair| {
                        pair.split_once('=')
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .with_context(|| format!("query parameter {pair} is not key=value"))
                    })
                    .collect::<Result<_>>()?,
            },
            "post" => Command::Post {
                path: path()?,
                body: parse_body(rest.get(1))?,
            },
            "patch" => Command::Patch {
                path: path()?,
                body: parse_body(rest.get(1))?,
            },
            "delete" => Command::Delete { path: path()? },
            other => bail!("unknown command {other}\n\n{USAGE}"),
        };
        Ok(command)
    }

    pub async fn run(self, account: &AccountApi) -> Result<Value> {
        let gateway = account.gateway();
        let output = match self {
            Command::Login { email } => {
                let password = std::env::var("COUNSEL_PASSWORD")
                    .context("COUNSEL_PASSWORD must be set to log in")?;
                let response = account.login(&LoginRequest::new(email, password)).await?;
                json!({
                    "user": response.user,
                    "expires_in": response.expires_in,
                })
            }
            Command::Logout => {
                let response = account.logout(None).await?;
                json!({ "message": response.message })
            }
            Command::Whoami => serde_json::to_value(account.profile().await?)?,
            Command::Status => json!({
                "authenticated": account.is_authenticated().await,
                "email_verified": account.is_email_verified().await,
                "user": account.current_user().await,
                "base_url": gateway.base_url(),
            }),
            Command::Refresh => {
                account.refresh().await?;
                json!({ "refreshed": true })
            }
            Command::Get { path, query } => {
                let request = query
                    .into_iter()
                    .fold(RequestDescriptor::get(path), |request, (key, value)| {
                        request.query_pair(key, value)
                    });
                gateway.send(request).await?
            }
            Command::Post { path, body } => gateway.post(&path, &body).await?,
            Command::Patch { path, body } => gateway.patch(&path, &body).await?,
            Command::Delete { path } => gateway.delete(&path).await?,
        };
        Ok(output)
    }
}

fn parse_body(raw: Option<&String>) -> Result<Value> {
    match raw {
        Some(raw) => serde_json::from_str(raw).context("request body is not valid JSON"),
        None => Ok(json!({})),
    }
}
