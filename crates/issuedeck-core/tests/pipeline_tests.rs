//! Integration tests for the TrackerClient public interface.
//!
//! These drive the client end to end against scripted transports, and on
//! unix against a shell script standing in for the HTTP tool.

use async_trait::async_trait;
use issuedeck_core::{
    ApiVersion, CacheStore, CancellationToken, EnumerationConfig, IssuedeckError, Method,
    Request, Tier, TrackerClient, TrackerConfig, Transport,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

type Handler = Box<dyn Fn(&Request) -> issuedeck_core::Result<Value> + Send + Sync>;

/// Transport routing requests to a handler and recording them.
struct RecordingTransport {
    requests: Mutex<Vec<Request>>,
    handler: Handler,
}

impl RecordingTransport {
    fn new(
        handler: impl Fn(&Request) -> issuedeck_core::Result<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        })
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(&self, request: Request) -> issuedeck_core::Result<Value> {
        let result = (self.handler)(&request);
        self.requests.lock().unwrap().push(request);
        result
    }
}

fn config(version: ApiVersion) -> TrackerConfig {
    TrackerConfig::new("https://tracker.example", "tok")
        .with_auth_type("pat")
        .with_api_version(version)
}

fn cache_in(temp_dir: &TempDir) -> Arc<CacheStore> {
    Arc::new(CacheStore::new(temp_dir.path().join("issuedeck").join("cache.json")))
}

#[tokio::test]
async fn test_v3_search_follows_page_tokens() {
    let temp_dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new(|request| {
        let body = request.body.as_ref().unwrap();
        match body.get("nextPageToken").and_then(Value::as_str) {
            None => Ok(json!({"issues": [{"key": "A-1"}, {"key": "A-2"}], "nextPageToken": "p2"})),
            Some("p2") => Ok(json!({"issues": [{"key": "A-3"}], "isLast": true})),
            Some(other) => panic!("unexpected token {}", other),
        }
    });
    let client = TrackerClient::with_transport(
        config(ApiVersion::V3),
        transport.clone(),
        cache_in(&temp_dir),
    );

    let issues = client
        .search_issues("project = A", &["summary".to_string()])
        .await
        .unwrap();

    let keys: Vec<_> = issues.iter().map(|i| i["key"].as_str().unwrap()).collect();
    assert_eq!(keys, vec!["A-1", "A-2", "A-3"]);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|r| r.method == Method::Post && r.endpoint == "/rest/api/3/search/jql"));
}

#[tokio::test]
async fn test_v2_search_follows_offsets() {
    let temp_dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new(|request| {
        let start_at = request.body.as_ref().unwrap()["startAt"].as_u64().unwrap();
        let issues: Vec<Value> = (start_at..(start_at + 100).min(150))
            .map(|i| json!({"id": i}))
            .collect();
        Ok(json!({"startAt": start_at, "total": 150, "issues": issues}))
    });
    let client = TrackerClient::with_transport(
        config(ApiVersion::V2),
        transport.clone(),
        cache_in(&temp_dir),
    );

    let issues = client.search_issues("assignee = currentUser()", &[]).await.unwrap();

    assert_eq!(issues.len(), 150);
    assert_eq!(transport.requests().len(), 2);
    assert_eq!(transport.requests()[0].endpoint, "/rest/api/2/search");
}

#[tokio::test]
async fn test_protocol_error_reaches_caller() {
    let temp_dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new(|_| {
        Err(IssuedeckError::Protocol {
            message: "summary: You must specify a summary of the issue.".into(),
        })
    });
    let client =
        TrackerClient::with_transport(config(ApiVersion::V3), transport, cache_in(&temp_dir));

    let err = client
        .request(Method::Post, "issue", Some(json!({"fields": {}})))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("You must specify a summary"));
}

#[tokio::test]
async fn test_add_comment_uses_adapter_payload() {
    let temp_dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new(|_| Ok(json!({"id": "10001"})));
    let client = TrackerClient::with_transport(
        config(ApiVersion::V2),
        transport.clone(),
        cache_in(&temp_dir),
    );

    client.add_comment("A-1", "Looks good").await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests[0].endpoint, "/rest/api/2/issue/A-1/comment");
    assert_eq!(requests[0].body, Some(json!({"body": "Looks good"})));
}

#[tokio::test]
async fn test_transitions_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new(|request| match request.method {
        Method::Get => Ok(json!({"transitions": [{"id": "31", "name": "Done"}]})),
        _ => Ok(json!({})),
    });
    let client = TrackerClient::with_transport(
        config(ApiVersion::V3),
        transport.clone(),
        cache_in(&temp_dir),
    );

    let transitions = client.get_transitions("A-1").await.unwrap();
    assert_eq!(transitions[0]["name"], "Done");

    client.transition_issue("A-1", "31").await.unwrap();
    let requests = transport.requests();
    assert_eq!(
        requests[1].body,
        Some(json!({"transition": {"id": "31"}}))
    );
}

#[tokio::test]
async fn test_issue_types_are_persisted_across_stores() {
    let temp_dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new(|_| {
        Ok(json!({"key": "A", "issueTypes": [{"name": "Bug"}, {"name": "Story"}]}))
    });
    let cache = cache_in(&temp_dir);
    let client =
        TrackerClient::with_transport(config(ApiVersion::V3), transport.clone(), cache.clone());

    let first = client.issue_types("A").await.unwrap();
    let second = client.issue_types("A").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(transport.requests().len(), 1);

    cache.flush().unwrap();
    let reopened = CacheStore::new(cache.document_path());
    assert_eq!(reopened.get(["issue_types", "A"], Tier::Persisted), Some(first));
    assert_eq!(reopened.get(["issue_types", "A"], Tier::Ephemeral), None);
}

#[tokio::test(start_paused = true)]
async fn test_assignable_users_memoized_per_project() {
    let temp_dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new(|request| {
        let query = request.query_param("query").unwrap();
        Ok(json!([{"accountId": format!("id-{}", query)}]))
    });
    let client = TrackerClient::with_transport(
        config(ApiVersion::V3),
        transport.clone(),
        cache_in(&temp_dir),
    )
    .with_enumeration_config(EnumerationConfig::default().with_throttle(Duration::from_millis(10)));

    let first = client.assignable_users(Some("A"), Some("A-1")).await.unwrap();
    assert_eq!(first.len(), 36);
    assert_eq!(transport.requests().len(), 36);

    let second = client.assignable_users(Some("A"), None).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(transport.requests().len(), 36);

    client.assignable_users(Some("B"), None).await.unwrap();
    assert_eq!(transport.requests().len(), 72);
}

#[tokio::test(start_paused = true)]
async fn test_spawned_enumeration_delivers_once() {
    let temp_dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new(|_| Ok(json!([])));
    let client =
        TrackerClient::with_transport(config(ApiVersion::V3), transport, cache_in(&temp_dir));

    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    client
        .spawn_assignable_users(
            Some("A".into()),
            None,
            CancellationToken::new(),
            Some(Box::new(move |result| {
                sink.lock().unwrap().push(result.map(|users| users.len()));
            })),
        )
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(*calls[0].as_ref().unwrap(), 0);
}

#[tokio::test]
async fn test_spawn_request_without_continuation_is_silent() {
    let temp_dir = TempDir::new().unwrap();
    let transport = RecordingTransport::new(|_| Err(IssuedeckError::Other("down".into())));
    let client = Arc::new(TrackerClient::with_transport(
        config(ApiVersion::V3),
        transport.clone(),
        cache_in(&temp_dir),
    ));

    let handle = client.spawn_request(Method::Get, "myself", None, None);
    assert!(handle.await.is_ok());
    assert_eq!(transport.requests()[0].endpoint, "/rest/api/3/myself");
}

#[cfg(unix)]
#[tokio::test]
async fn test_client_through_external_process() {
    let temp_dir = TempDir::new().unwrap();
    // Echo the final argument (the URL) back as JSON.
    let config = config(ApiVersion::V3)
        .with_curl_program("/bin/sh")
        .with_extra_args([
            "-c",
            r#"for a; do last=$a; done; printf '{"url":"%s"}' "$last""#,
            "fake-curl",
        ]);
    let client = TrackerClient::new(config, cache_in(&temp_dir)).unwrap();

    let value = client.get_issue("A-1").await.unwrap();
    assert_eq!(
        value,
        json!({"url": "https://tracker.example/rest/api/3/issue/A-1"})
    );
}
