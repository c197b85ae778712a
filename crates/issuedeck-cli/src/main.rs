//! issuedeck - command-line front end for the issue-tracker request pipeline.
//!
//! Every command prints its result as JSON on stdout. Logs go to stderr.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use issuedeck_core::{
    ApiVersion, CacheKey, CacheStore, CancellationToken, Method, Tier, TrackerClient,
    TrackerConfig,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "issuedeck")]
#[command(about = "Query an issue tracker from the command line")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Persisted cache document (defaults to the platform data directory)
    #[arg(long, global = true)]
    cache_file: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct ConnectionArgs {
    /// Tracker base URL
    #[arg(long, env = "ISSUEDECK_URL", global = true)]
    base_url: Option<String>,

    /// Account email (basic auth)
    #[arg(long, env = "ISSUEDECK_EMAIL", global = true)]
    email: Option<String>,

    /// API token or personal access token
    #[arg(long, env = "ISSUEDECK_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// "pat" for bearer auth, anything else for basic auth
    #[arg(long, env = "ISSUEDECK_AUTH_TYPE", default_value = "basic", global = true)]
    auth_type: String,

    /// REST API version (2 or 3)
    #[arg(long, env = "ISSUEDECK_API_VERSION", default_value = "3", global = true)]
    api_version: ApiVersion,

    /// Kill a request after this many milliseconds
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one request to a path below the API root
    Request {
        method: Method,
        path: String,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
    },
    /// List every assignable user
    Assignable {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        issue: Option<String>,
    },
    /// Run a JQL search and print all matching issues
    Search {
        jql: String,
        /// Field to include (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,
    },
    /// Print a project's issue types (cached across runs)
    IssueTypes { project: String },
    /// Inspect or clear the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Print one cached value
    Get {
        key: String,
        /// Use the persisted tier
        #[arg(long)]
        persist: bool,
    },
    /// Remove one key, or the whole tier when no key is given
    Clear {
        key: Option<String>,
        /// Use the persisted tier
        #[arg(long)]
        persist: bool,
    },
}

impl ConnectionArgs {
    fn tracker_config(&self) -> Result<TrackerConfig> {
        let base_url = self
            .base_url
            .clone()
            .ok_or_else(|| anyhow!("--base-url or ISSUEDECK_URL is required"))?;
        let token = self
            .token
            .clone()
            .ok_or_else(|| anyhow!("--token or ISSUEDECK_TOKEN is required"))?;

        let mut config = TrackerConfig::new(base_url, token)
            .with_auth_type(self.auth_type.clone())
            .with_api_version(self.api_version);
        if let Some(email) = &self.email {
            config = config.with_email(email.clone());
        }
        if let Some(millis) = self.timeout_ms {
            config = config.with_request_timeout(Duration::from_millis(millis));
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cache = Arc::new(match &args.cache_file {
        Some(path) => CacheStore::new(path),
        None => CacheStore::open_default()?,
    });
    debug!("Cache document: {}", cache.document_path().display());

    let output = run(&args, Arc::clone(&cache)).await;

    // Background writes are best-effort; make sure the last one lands.
    cache.flush().context("Failed to write cache document")?;

    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}

async fn run(args: &Args, cache: Arc<CacheStore>) -> Result<Value> {
    let connect = || -> Result<TrackerClient> {
        Ok(TrackerClient::new(
            args.connection.tracker_config()?,
            Arc::clone(&cache),
        )?)
    };

    let value = match &args.command {
        Command::Cache { action } => run_cache_action(action, &cache),
        Command::Request { method, path, body } => {
            let body = body
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .context("--body is not valid JSON")?;
            connect()?.request(*method, path, body).await?
        }
        Command::Assignable { project, issue } => {
            let users = assignable_users(&connect()?, project.clone(), issue.clone()).await?;
            Value::Array(users)
        }
        Command::Search { jql, fields } => {
            Value::Array(connect()?.search_issues(jql, fields).await?)
        }
        Command::IssueTypes { project } => connect()?.issue_types(project).await?,
    };
    Ok(value)
}

/// Enumerate assignable users, cancelling cleanly on Ctrl-C.
async fn assignable_users(
    client: &TrackerClient,
    project: Option<String>,
    issue: Option<String>,
) -> Result<Vec<Value>> {
    let cancel = CancellationToken::new();
    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = client.spawn_assignable_users(
        project,
        issue,
        cancel.clone(),
        Some(Box::new(move |result| {
            let _ = tx.send(result);
        })),
    );

    tokio::select! {
        result = rx => {
            let users = result.context("Enumeration task ended without a result")??;
            info!("Found {} assignable users", users.len());
            Ok(users)
        }
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            handle.abort();
            bail!("Interrupted")
        }
    }
}

fn run_cache_action(action: &CacheAction, cache: &CacheStore) -> Value {
    match action {
        CacheAction::Get { key, persist } => cache
            .get(key.as_str(), Tier::from(*persist))
            .unwrap_or(Value::Null),
        CacheAction::Clear { key, persist } => {
            let key = key.as_deref().map(CacheKey::from);
            cache.clear(key.as_ref(), Tier::from(*persist));
            Value::Bool(true)
        }
    }
}
