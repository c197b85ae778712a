//! Tracker client facade.
//!
//! [`TrackerClient`] is what editor or CLI collaborators hold on to. It owns
//! the transport, the version adapter and a handle to the shared cache, and
//! offers both `async fn` operations and `spawn_*` variants that report
//! through a [`Continuation`].

use crate::adapter::{adapter_for, ApiAdapter};
use crate::cache::{CacheKey, CacheStore, Tier};
use crate::cancel::CancellationToken;
use crate::config::{EnumerationConfig, NetworkConfig, TrackerConfig};
use crate::continuation::{spawn_with_continuation, Continuation};
use crate::enumerate::AssignableEnumerator;
use crate::error::{IssuedeckError, Result};
use crate::transport::{CurlExecutor, Method, Request, Transport};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Persisted cache namespace for project issue types.
pub const ISSUE_TYPES_CACHE_NAMESPACE: &str = "issue_types";

/// Client for the tracker REST API.
pub struct TrackerClient {
    config: TrackerConfig,
    transport: Arc<dyn Transport>,
    adapter: Arc<dyn ApiAdapter>,
    cache: Arc<CacheStore>,
    enumerator: Arc<AssignableEnumerator>,
}

impl TrackerClient {
    /// Create a client that runs requests through the configured HTTP tool.
    pub fn new(config: TrackerConfig, cache: Arc<CacheStore>) -> Result<Self> {
        let executor = CurlExecutor::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(executor), cache))
    }

    /// Create a client on top of an arbitrary transport.
    pub fn with_transport(
        config: TrackerConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<CacheStore>,
    ) -> Self {
        let adapter = adapter_for(config.api_version);
        let enumerator = Arc::new(AssignableEnumerator::new(
            Arc::clone(&transport),
            Arc::clone(&cache),
            adapter.get_api_path(),
        ));
        Self {
            config,
            transport,
            adapter,
            cache,
            enumerator,
        }
    }

    /// Replace the enumeration tuning (throttle, depth, page size).
    pub fn with_enumeration_config(mut self, enumeration: EnumerationConfig) -> Self {
        self.enumerator = Arc::new(
            AssignableEnumerator::new(
                Arc::clone(&self.transport),
                Arc::clone(&self.cache),
                self.adapter.get_api_path(),
            )
            .with_config(enumeration),
        );
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn adapter(&self) -> &Arc<dyn ApiAdapter> {
        &self.adapter
    }

    /// Absolute endpoint path for a path relative to the API root.
    pub fn api_path(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.adapter.get_api_path(), path)
    }

    /// Send a request to a path relative to the API root.
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let mut request = Request::new(method, self.api_path(path));
        request.body = body;
        self.transport.execute(request).await
    }

    /// Send a fully formed request.
    pub async fn execute(&self, request: Request) -> Result<Value> {
        self.transport.execute(request).await
    }

    /// Send a request on a background task and deliver the outcome.
    pub fn spawn_request(
        self: &Arc<Self>,
        method: Method,
        path: &str,
        body: Option<Value>,
        continuation: Option<Continuation<Value>>,
    ) -> JoinHandle<()> {
        let client = Arc::clone(self);
        let path = path.to_string();
        spawn_with_continuation(
            async move { client.request(method, &path, body).await },
            continuation,
        )
    }

    /// Run a JQL search and collect every page.
    pub async fn search_issues(&self, jql: &str, fields: &[String]) -> Result<Vec<Value>> {
        let search_path = self.adapter.get_search_path();
        let mut issues = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let body = self.adapter.transform_search_data(
                jql,
                page_token.as_deref(),
                NetworkConfig::SEARCH_PAGE_SIZE,
                fields,
            );
            let raw = self
                .transport
                .execute(Request::post(search_path.clone(), body))
                .await?;
            let page = self.adapter.transform_search_response(raw)?;
            debug!("Search page returned {} issues", page.issues.len());
            issues.extend(page.issues);

            match page.next_page_token {
                Some(next) if page_token.as_deref() == Some(next.as_str()) => {
                    warn!("Search returned the same page token twice, stopping");
                    break;
                }
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(issues)
    }

    pub async fn get_issue(&self, key: &str) -> Result<Value> {
        self.request(Method::Get, &format!("issue/{}", key), None).await
    }

    pub async fn get_transitions(&self, key: &str) -> Result<Vec<Value>> {
        let response = self
            .request(Method::Get, &format!("issue/{}/transitions", key), None)
            .await?;
        match response.get("transitions") {
            Some(Value::Array(transitions)) => Ok(transitions.clone()),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn transition_issue(&self, key: &str, transition_id: &str) -> Result<()> {
        self.request(
            Method::Post,
            &format!("issue/{}/transitions", key),
            Some(json!({ "transition": { "id": transition_id } })),
        )
        .await?;
        Ok(())
    }

    pub async fn add_comment(&self, key: &str, text: &str) -> Result<Value> {
        let body = self.adapter.transform_comment_data(text);
        self.request(Method::Post, &format!("issue/{}/comment", key), Some(body))
            .await
    }

    /// Issue types of a project, cached across runs in the persisted tier.
    pub async fn issue_types(&self, project: &str) -> Result<Value> {
        let key = CacheKey::from([ISSUE_TYPES_CACHE_NAMESPACE, project]);
        if let Some(cached) = self.cache.get(&key, Tier::Persisted) {
            return Ok(cached);
        }

        let response = self
            .request(Method::Get, &format!("project/{}", project), None)
            .await?;
        let issue_types = match response.get("issueTypes") {
            Some(types @ Value::Array(_)) => types.clone(),
            _ => {
                return Err(IssuedeckError::Decode {
                    reason: "project response has no issueTypes list".to_string(),
                    raw: response.to_string(),
                })
            }
        };

        self.cache.set(key, issue_types.clone(), Tier::Persisted);
        Ok(issue_types)
    }

    /// Every user assignable in `project` (and optionally on `issue`).
    pub async fn assignable_users(
        &self,
        project: Option<&str>,
        issue: Option<&str>,
    ) -> Result<Vec<Value>> {
        self.enumerator
            .enumerate(project, issue, &CancellationToken::new())
            .await
    }

    /// Enumerate assignable users on a background task.
    pub fn spawn_assignable_users(
        &self,
        project: Option<String>,
        issue: Option<String>,
        cancel: CancellationToken,
        continuation: Option<Continuation<Vec<Value>>>,
    ) -> JoinHandle<()> {
        self.enumerator.spawn(project, issue, cancel, continuation)
    }
}

impl std::fmt::Debug for TrackerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerClient")
            .field("config", &self.config)
            .field("api_path", &self.adapter.get_api_path())
            .field("cache", &self.cache)
            .finish()
    }
}
