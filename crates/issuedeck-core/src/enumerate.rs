//! Exhaustive listing of assignable users.
//!
//! The assignable-user search endpoint returns at most one page per query
//! and has no paging. A full page may be hiding more matches, so the
//! enumerator walks query prefixes breadth-first: every single character of
//! the alphabet first, then one character longer below each prefix whose
//! page came back full, down to a fixed depth. Results are deduplicated by
//! account identity.
//!
//! Requests are issued one at a time with a throttle delay between them.
//! Any failed request aborts the whole enumeration.

use crate::cache::{CacheKey, CacheStore, Tier};
use crate::cancel::CancellationToken;
use crate::config::EnumerationConfig;
use crate::continuation::{spawn_with_continuation, Continuation};
use crate::error::{IssuedeckError, Result};
use crate::transport::{with_query, Request, Transport};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Ephemeral cache namespace for completed scoped enumerations.
pub const ASSIGNABLE_CACHE_NAMESPACE: &str = "assignable_users";

/// Identity fields, in order of preference.
const IDENTITY_FIELDS: [&str; 2] = ["accountId", "name"];

/// Breadth-first prefix enumerator over the assignable-user search.
pub struct AssignableEnumerator {
    transport: Arc<dyn Transport>,
    cache: Arc<CacheStore>,
    api_path: String,
    config: EnumerationConfig,
}

impl AssignableEnumerator {
    /// Create an enumerator issuing requests below `api_path`.
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<CacheStore>,
        api_path: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            cache,
            api_path: api_path.into(),
            config: EnumerationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EnumerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EnumerationConfig {
        &self.config
    }

    /// Cache key of a completed enumeration for `scope`.
    pub fn cache_key(scope: &str) -> CacheKey {
        CacheKey::from([ASSIGNABLE_CACHE_NAMESPACE, scope])
    }

    /// List every assignable user, optionally restricted to a project
    /// (`scope`) and an issue (`context`).
    ///
    /// Scoped results are memoized in the ephemeral cache tier and served
    /// from there on later calls. Unscoped results are never cached.
    pub async fn enumerate(
        &self,
        scope: Option<&str>,
        context: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>> {
        if let Some(scope) = scope {
            if let Some(Value::Array(items)) =
                self.cache.get(Self::cache_key(scope), Tier::Ephemeral)
            {
                debug!("Serving {} assignable users for {} from cache", items.len(), scope);
                return Ok(items);
            }
        }

        let mut state = EnumerationState::new(&self.config.alphabet);
        let mut issued = 0usize;

        loop {
            cancel.check()?;
            let Some(prefix) = state.pending.pop_front() else {
                break;
            };
            if !state.processed.insert(prefix.clone()) {
                continue;
            }

            if issued > 0 {
                tokio::time::sleep(self.config.throttle).await;
            }
            issued += 1;

            let response = self
                .transport
                .execute(self.search_request(&prefix, scope, context))
                .await?;
            let page = into_page(response)?;
            let saturated = page.len() >= self.config.page_size;
            let added = state.absorb(page);
            debug!("Prefix '{}': {} new users", prefix, added);

            if saturated && prefix.chars().count() < self.config.max_depth {
                debug!("Prefix '{}' returned a full page, refining", prefix);
                state.expand(&prefix, &self.config.alphabet);
            }
        }

        info!(
            "Enumerated {} assignable users with {} requests",
            state.items.len(),
            issued
        );

        if let Some(scope) = scope {
            self.cache.set(
                Self::cache_key(scope),
                Value::Array(state.items.clone()),
                Tier::Ephemeral,
            );
        }

        Ok(state.items)
    }

    /// Run [`enumerate`](Self::enumerate) as a task and deliver the outcome.
    ///
    /// Aborting the returned handle stops the loop before the next prefix.
    pub fn spawn(
        self: &Arc<Self>,
        scope: Option<String>,
        context: Option<String>,
        cancel: CancellationToken,
        continuation: Option<Continuation<Vec<Value>>>,
    ) -> JoinHandle<()> {
        let enumerator = Arc::clone(self);
        spawn_with_continuation(
            async move {
                enumerator
                    .enumerate(scope.as_deref(), context.as_deref(), &cancel)
                    .await
            },
            continuation,
        )
    }

    fn search_request(&self, prefix: &str, scope: Option<&str>, context: Option<&str>) -> Request {
        let page_size = self.config.page_size.to_string();
        let path = format!("{}/user/assignable/search", self.api_path);
        Request::get(with_query(
            &path,
            &[
                ("query", Some(prefix)),
                ("project", scope),
                ("issueKey", context),
                ("maxResults", Some(page_size.as_str())),
            ],
        ))
    }
}

/// Per-call bookkeeping, discarded when the enumeration ends.
struct EnumerationState {
    pending: VecDeque<String>,
    processed: HashSet<String>,
    items: Vec<Value>,
    seen: HashSet<String>,
}

impl EnumerationState {
    fn new(alphabet: &[char]) -> Self {
        Self {
            pending: alphabet.iter().map(|c| c.to_string()).collect(),
            processed: HashSet::new(),
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Append unseen items, returning how many were new.
    fn absorb(&mut self, page: Vec<Value>) -> usize {
        let mut added = 0;
        for item in page {
            let Some(id) = identity(&item) else {
                debug!("Skipping user without identity: {}", item);
                continue;
            };
            if self.seen.insert(id) {
                self.items.push(item);
                added += 1;
            }
        }
        added
    }

    fn expand(&mut self, prefix: &str, alphabet: &[char]) {
        self.pending
            .extend(alphabet.iter().map(|c| format!("{}{}", prefix, c)));
    }
}

fn identity(item: &Value) -> Option<String> {
    IDENTITY_FIELDS.iter().find_map(|field| match item.get(*field) {
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}

fn into_page(response: Value) -> Result<Vec<Value>> {
    match response {
        Value::Array(items) => Ok(items),
        Value::Object(map) if map.is_empty() => Ok(Vec::new()),
        other => Err(IssuedeckError::Decode {
            reason: "assignable user search did not return a list".to_string(),
            raw: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    type Responder = Box<dyn Fn(&str) -> Result<Value> + Send + Sync>;

    /// Transport answering by query prefix and recording every request.
    struct ScriptedTransport {
        requests: Mutex<Vec<Request>>,
        respond: Responder,
    }

    impl ScriptedTransport {
        fn new(respond: impl Fn(&str) -> Result<Value> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        fn queries(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.query_param("query").unwrap_or_default())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, request: Request) -> Result<Value> {
            let query = request.query_param("query").unwrap_or_default();
            self.requests.lock().unwrap().push(request);
            (self.respond)(&query)
        }
    }

    fn users(prefix: &str, count: usize) -> Value {
        Value::Array(
            (0..count)
                .map(|i| json!({"accountId": format!("{}-{}", prefix, i), "displayName": prefix}))
                .collect(),
        )
    }

    fn enumerator(transport: Arc<ScriptedTransport>, temp_dir: &TempDir) -> AssignableEnumerator {
        let cache = Arc::new(CacheStore::new(temp_dir.path().join("cache.json")));
        AssignableEnumerator::new(transport, cache, "/rest/api/3")
    }

    fn ids(items: &[Value]) -> Vec<String> {
        items.iter().filter_map(identity).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsaturated_pages_issue_one_request_per_symbol() {
        let temp_dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(|query| {
            Ok(json!([
                {"accountId": "shared"},
                {"accountId": format!("{}-0", query)},
            ]))
        });
        let enumerator = enumerator(transport.clone(), &temp_dir);

        let items = enumerator
            .enumerate(None, None, &CancellationToken::new())
            .await
            .unwrap();

        let queries = transport.queries();
        assert_eq!(queries.len(), 36);
        assert_eq!(queries[0], "a");
        assert_eq!(queries[25], "z");
        assert_eq!(queries[35], "9");

        assert_eq!(items.len(), 37);
        let ids = ids(&items);
        assert_eq!(ids[0], "shared");
        assert_eq!(ids[1], "a-0");
        assert_eq!(ids[36], "9-0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_pages_expand_breadth_first_to_depth_three() {
        let temp_dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(|query| match query {
            "a" | "aa" | "aaa" => Ok(users(query, 100)),
            _ => Ok(json!([])),
        });
        let enumerator = enumerator(transport.clone(), &temp_dir);

        let items = enumerator
            .enumerate(None, None, &CancellationToken::new())
            .await
            .unwrap();

        let queries = transport.queries();
        assert_eq!(queries.len(), 36 * 3);
        assert!(queries[..36].iter().all(|q| q.len() == 1));
        assert_eq!(queries[36], "aa");
        assert_eq!(queries[71], "a9");
        assert_eq!(queries[72], "aaa");
        assert_eq!(queries[107], "aa9");
        assert!(queries.iter().all(|q| q.len() <= 3));

        assert_eq!(items.len(), 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_found_under_two_prefixes_counts_once() {
        let temp_dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(|query| match query {
            "a" => Ok(json!([{"accountId": "u-1", "displayName": "Alan Bates"}])),
            "b" => Ok(json!([
                {"accountId": "u-1", "displayName": "Alan Bates"},
                {"name": "bob", "displayName": "Bob"},
            ])),
            "o" => Ok(json!([{"name": "bob"}])),
            _ => Ok(json!([])),
        });
        let enumerator = enumerator(transport, &temp_dir);

        let items = enumerator
            .enumerate(None, None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(ids(&items), vec!["u-1", "bob"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoped_result_is_served_from_cache() {
        let temp_dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(|query| Ok(users(query, 1)));
        let enumerator = enumerator(transport.clone(), &temp_dir);
        let cancel = CancellationToken::new();

        let first = enumerator.enumerate(Some("PROJ"), None, &cancel).await.unwrap();
        assert_eq!(transport.queries().len(), 36);
        assert!(enumerator
            .cache
            .get("assignable_users.PROJ", Tier::Ephemeral)
            .is_some());

        let second = enumerator.enumerate(Some("PROJ"), None, &cancel).await.unwrap();
        assert_eq!(transport.queries().len(), 36);
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unscoped_result_is_never_cached() {
        let temp_dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(|query| Ok(users(query, 1)));
        let enumerator = enumerator(transport.clone(), &temp_dir);
        let cancel = CancellationToken::new();

        enumerator.enumerate(None, Some("PROJ-1"), &cancel).await.unwrap();
        assert!(enumerator.cache.is_empty(Tier::Ephemeral));

        enumerator.enumerate(None, Some("PROJ-1"), &cancel).await.unwrap();
        assert_eq!(transport.queries().len(), 72);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_and_context_are_sent_as_filters() {
        let temp_dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(|_| Ok(json!([])));
        let enumerator = enumerator(transport.clone(), &temp_dir);

        enumerator
            .enumerate(Some("PROJ"), Some("PROJ-7"), &CancellationToken::new())
            .await
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        let first = &requests[0];
        assert!(first.endpoint.starts_with("/rest/api/3/user/assignable/search?"));
        assert_eq!(first.query_param("project").as_deref(), Some("PROJ"));
        assert_eq!(first.query_param("issueKey").as_deref(), Some("PROJ-7"));
        assert_eq!(first.query_param("maxResults").as_deref(), Some("100"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_aborts_without_partial_results() {
        let temp_dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(|query| match query {
            "c" => Err(IssuedeckError::Transport {
                exit_code: Some(28),
                stderr: "timed out".into(),
            }),
            _ => Ok(users(query, 1)),
        });
        let enumerator = Arc::new(enumerator(transport.clone(), &temp_dir));

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        enumerator
            .spawn(
                Some("PROJ".into()),
                None,
                CancellationToken::new(),
                Some(Box::new(move |result| {
                    let _ = tx.send(result);
                })),
            )
            .await
            .unwrap();

        let mut rx = rx;
        let result = rx.recv().await.unwrap();
        assert!(matches!(result, Err(IssuedeckError::Transport { .. })));
        assert!(rx.recv().await.is_none());

        assert_eq!(transport.queries(), vec!["a", "b", "c"]);
        assert!(enumerator.cache.is_empty(Tier::Ephemeral));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_throttled() {
        let temp_dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(|_| Ok(json!([])));
        let enumerator = enumerator(transport, &temp_dir)
            .with_config(EnumerationConfig::default().with_throttle(Duration::from_millis(250)));

        let started = tokio::time::Instant::now();
        enumerator
            .enumerate(None, None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(250 * 35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_dequeuing() {
        let temp_dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let transport = ScriptedTransport::new(move |query| {
            if query == "b" {
                trigger.cancel();
            }
            Ok(json!([]))
        });
        let enumerator = enumerator(transport.clone(), &temp_dir);

        let err = enumerator.enumerate(Some("PROJ"), None, &cancel).await.unwrap_err();

        assert!(matches!(err, IssuedeckError::Cancelled));
        assert_eq!(transport.queries(), vec!["a", "b"]);
        assert!(enumerator.cache.is_empty(Tier::Ephemeral));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_list_response_is_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(|_| Ok(json!({"unexpected": true})));
        let enumerator = enumerator(transport, &temp_dir);

        let err = enumerator
            .enumerate(None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IssuedeckError::Decode { .. }));
    }

    #[test]
    fn test_identity_prefers_account_id() {
        assert_eq!(
            identity(&json!({"accountId": "abc", "name": "bob"})).as_deref(),
            Some("abc")
        );
        assert_eq!(identity(&json!({"name": "bob"})).as_deref(), Some("bob"));
        assert_eq!(identity(&json!({"accountId": "", "name": "bob"})).as_deref(), Some("bob"));
        assert_eq!(identity(&json!({"displayName": "?"})), None);
    }

    #[test]
    fn test_duplicate_prefixes_are_processed_once() {
        let mut state = EnumerationState::new(&['a']);
        state.expand("", &['a']);
        assert_eq!(state.pending.len(), 2);

        let mut processed = 0;
        while let Some(prefix) = state.pending.pop_front() {
            if state.processed.insert(prefix) {
                processed += 1;
            }
        }
        assert_eq!(processed, 1);
    }
}
