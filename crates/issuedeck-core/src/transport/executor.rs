//! Request execution through an external HTTP tool.
//!
//! Each request spawns one `curl` process (or a compatible program). Headers
//! and request bodies are staged in temporary files and passed by reference.
//! That keeps credentials out of the process table and large or quote-heavy
//! JSON out of the argument list. Staged files are removed when the request
//! finishes, whatever the outcome.

use super::auth::Auth;
use super::request::Request;
use super::response::interpret_output;
use crate::config::{NetworkConfig, TrackerConfig};
use crate::continuation::{spawn_with_continuation, Continuation};
use crate::error::{IssuedeckError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Something that can perform one request and decode its response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Value>;
}

/// Runs requests through an external HTTP tool.
pub struct CurlExecutor {
    base_url: String,
    auth: Auth,
    program: PathBuf,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
    /// Directory for staged request bodies (system temp dir when `None`).
    staging_dir: Option<PathBuf>,
}

impl CurlExecutor {
    /// Create an executor from the tracker configuration.
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        url::Url::parse(&base_url).map_err(|e| {
            IssuedeckError::config(format!("Invalid base URL '{}': {}", config.base_url, e))
        })?;

        Ok(Self {
            base_url,
            auth: Auth::resolve(config)?,
            program: config.curl_program.clone(),
            extra_args: config.extra_args.clone(),
            timeout: config.request_timeout(),
            staging_dir: None,
        })
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stage request bodies in `dir` instead of the system temp dir.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Fully qualified URL for an endpoint path.
    pub fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    /// Execute on the current runtime and hand the outcome to `continuation`.
    pub fn spawn(
        self: &Arc<Self>,
        request: Request,
        continuation: Option<Continuation<Value>>,
    ) -> JoinHandle<()> {
        let executor = Arc::clone(self);
        spawn_with_continuation(
            async move { executor.execute(request).await },
            continuation,
        )
    }

    /// Header lines sent with every request.
    fn headers(&self) -> [String; 3] {
        [
            format!("Authorization: {}", self.auth.header_value()),
            format!("Content-Type: {}", NetworkConfig::JSON_CONTENT_TYPE),
            format!("Accept: {}", NetworkConfig::JSON_CONTENT_TYPE),
        ]
    }

    fn build_args(
        &self,
        request: &Request,
        header_file: &Path,
        body_file: Option<&Path>,
    ) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend([
            "--silent".to_string(),
            "--show-error".to_string(),
            "--request".to_string(),
            request.method.as_str().to_string(),
            "--header".to_string(),
            format!("@{}", header_file.display()),
        ]);
        if let Some(path) = body_file {
            args.push("--data-binary".to_string());
            args.push(format!("@{}", path.display()));
        }
        args.push(self.url_for(&request.endpoint));
        args
    }

    /// Create an owner-only temporary file in the staging directory.
    fn staging_file(&self, prefix: &str, suffix: &str) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(prefix).suffix(suffix);
        match &self.staging_dir {
            Some(dir) => builder
                .tempfile_in(dir)
                .map_err(|e| IssuedeckError::io_with_path(e, dir)),
            None => Ok(builder.tempfile()?),
        }
    }

    fn stage_headers(&self) -> Result<NamedTempFile> {
        let mut file = self.staging_file("issuedeck-headers-", ".txt")?;
        for header in self.headers() {
            writeln!(file, "{}", header)
                .map_err(|e| IssuedeckError::io_with_path(e, file.path()))?;
        }
        file.flush()
            .map_err(|e| IssuedeckError::io_with_path(e, file.path()))?;
        Ok(file)
    }

    fn stage_body(&self, body: &Value) -> Result<NamedTempFile> {
        let mut file = self.staging_file("issuedeck-body-", ".json")?;
        serde_json::to_writer(&mut file, body)?;
        file.flush()
            .map_err(|e| IssuedeckError::io_with_path(e, file.path()))?;
        Ok(file)
    }

    async fn run(&self, args: Vec<String>) -> Result<std::process::Output> {
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = command.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, output).await.map_err(|_| {
                warn!("Request process exceeded {:?}, killed", limit);
                IssuedeckError::Timeout(limit)
            })?,
            None => output.await,
        };

        output.map_err(|e| IssuedeckError::Spawn {
            program: self.program.display().to_string(),
            message: e.to_string(),
            source: Some(e),
        })
    }
}

#[async_trait]
impl Transport for CurlExecutor {
    async fn execute(&self, request: Request) -> Result<Value> {
        // Held until the process has finished; dropping them deletes the files.
        let headers = self.stage_headers()?;
        let body = match &request.body {
            Some(body) => Some(self.stage_body(body)?),
            None => None,
        };

        let args = self.build_args(
            &request,
            headers.path(),
            body.as_ref().map(|file| file.path()),
        );
        debug!("{} {}", request.method, request.endpoint);

        let output = self.run(args).await;
        drop(body);
        drop(headers);
        let output = output?;

        let result = interpret_output(
            output.status.success(),
            output.status.code(),
            &output.stdout,
            &output.stderr,
        );
        if let Err(e) = &result {
            debug!("{} {} failed: {}", request.method, request.endpoint, e);
        }
        result
    }
}

impl std::fmt::Debug for CurlExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurlExecutor")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .field("program", &self.program)
            .field("timeout", &self.timeout)
            .finish()
    }
}
