//! Endpoint and payload shapes per remote API version.
//!
//! The pipeline never branches on the API version itself; it asks an
//! [`ApiAdapter`] for paths and request/response transforms.

use crate::config::ApiVersion;
use crate::error::{IssuedeckError, Result};
use serde_json::{json, Value};
use std::sync::Arc;

/// One page of issue search results, normalized across API versions.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub issues: Vec<Value>,
    /// Token for the next page; `None` on the last page.
    pub next_page_token: Option<String>,
}

/// Version-specific endpoint paths and payload transforms.
pub trait ApiAdapter: Send + Sync {
    /// Path prefix of the REST API, e.g. `/rest/api/3`.
    fn get_api_path(&self) -> &'static str;

    /// Full path of the issue search endpoint.
    fn get_search_path(&self) -> String;

    fn transform_search_data(
        &self,
        jql: &str,
        page_token: Option<&str>,
        max_results: u32,
        fields: &[String],
    ) -> Value;

    fn transform_search_response(&self, raw: Value) -> Result<SearchPage>;

    fn transform_comment_data(&self, text: &str) -> Value;
}

/// Pick the adapter for an API version.
pub fn adapter_for(version: ApiVersion) -> Arc<dyn ApiAdapter> {
    match version {
        ApiVersion::V2 => Arc::new(V2Adapter),
        ApiVersion::V3 => Arc::new(V3Adapter),
    }
}

fn take_issues(raw: &mut Value) -> Result<Vec<Value>> {
    match raw.get_mut("issues").map(Value::take) {
        Some(Value::Array(issues)) => Ok(issues),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(IssuedeckError::Decode {
            reason: "search response field 'issues' is not a list".to_string(),
            raw: other.to_string(),
        }),
    }
}

/// Server/Data Center API: offset paging and plain-text comments.
#[derive(Debug, Clone, Copy, Default)]
pub struct V2Adapter;

impl ApiAdapter for V2Adapter {
    fn get_api_path(&self) -> &'static str {
        "/rest/api/2"
    }

    fn get_search_path(&self) -> String {
        format!("{}/search", self.get_api_path())
    }

    fn transform_search_data(
        &self,
        jql: &str,
        page_token: Option<&str>,
        max_results: u32,
        fields: &[String],
    ) -> Value {
        let start_at = page_token
            .and_then(|token| token.parse::<u64>().ok())
            .unwrap_or(0);
        json!({
            "jql": jql,
            "startAt": start_at,
            "maxResults": max_results,
            "fields": fields,
        })
    }

    fn transform_search_response(&self, mut raw: Value) -> Result<SearchPage> {
        let issues = take_issues(&mut raw)?;
        let start_at = raw.get("startAt").and_then(Value::as_u64).unwrap_or(0);
        let total = raw.get("total").and_then(Value::as_u64).unwrap_or(0);

        let next = start_at + issues.len() as u64;
        let next_page_token = if !issues.is_empty() && next < total {
            Some(next.to_string())
        } else {
            None
        };

        Ok(SearchPage {
            issues,
            next_page_token,
        })
    }

    fn transform_comment_data(&self, text: &str) -> Value {
        json!({ "body": text })
    }
}

/// Cloud API: token paging and document-format comments.
#[derive(Debug, Clone, Copy, Default)]
pub struct V3Adapter;

impl ApiAdapter for V3Adapter {
    fn get_api_path(&self) -> &'static str {
        "/rest/api/3"
    }

    fn get_search_path(&self) -> String {
        format!("{}/search/jql", self.get_api_path())
    }

    fn transform_search_data(
        &self,
        jql: &str,
        page_token: Option<&str>,
        max_results: u32,
        fields: &[String],
    ) -> Value {
        let mut body = json!({
            "jql": jql,
            "maxResults": max_results,
            "fields": fields,
        });
        if let Some(token) = page_token {
            body["nextPageToken"] = Value::String(token.to_string());
        }
        body
    }

    fn transform_search_response(&self, mut raw: Value) -> Result<SearchPage> {
        let issues = take_issues(&mut raw)?;
        let is_last = raw.get("isLast").and_then(Value::as_bool).unwrap_or(false);
        let next_page_token = raw
            .get("nextPageToken")
            .and_then(Value::as_str)
            .filter(|token| !is_last && !token.is_empty())
            .map(str::to_string);

        Ok(SearchPage {
            issues,
            next_page_token,
        })
    }

    fn transform_comment_data(&self, text: &str) -> Value {
        let paragraphs: Vec<Value> = text
            .lines()
            .map(|line| {
                if line.is_empty() {
                    json!({ "type": "paragraph", "content": [] })
                } else {
                    json!({
                        "type": "paragraph",
                        "content": [{ "type": "text", "text": line }],
                    })
                }
            })
            .collect();

        json!({
            "body": {
                "type": "doc",
                "version": 1,
                "content": paragraphs,
            }
        })
    }
}
