//! Loogle lemma search client.
//!
//! Queries the Loogle JSON endpoint for Lean/Mathlib declarations. The
//! response shape varies (`hits`, `results`, or a bare array, with several
//! key spellings per field), so items are normalized before they reach the
//! caller. Failures never propagate: they come back in `error`.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SearchError;

/// Public Loogle instance.
pub const DEFAULT_SEARCH_URL: &str = "https://loogle.lean-lang.org";

/// Default number of hits returned.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Upper bound on hits returned.
pub const MAX_SEARCH_LIMIT: usize = 20;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

/// One normalized search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Declaration name.
    pub name: Option<String>,
    /// Declaration type or signature.
    #[serde(rename = "type")]
    pub type_signature: Option<String>,
    /// Docstring, if any.
    pub doc: Option<String>,
    /// Where the hit can be viewed.
    pub source: String,
}

/// Search results for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub count: usize,
    pub results: Vec<SearchHit>,
    /// Human-facing URL for the same query.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    /// Serializes the response as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!("{{\"count\": 0, \"results\": [], \"error\": \"serialization failed: {e}\"}}")
        })
    }
}

/// HTTP client for the lemma index.
pub struct LemmaSearchClient {
    client: Client,
    base_url: String,
}

impl LemmaSearchClient {
    /// Creates a client for the public Loogle instance.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_SEARCH_URL)
    }

    /// Creates a client for another Loogle-compatible endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// URL of the JSON API for `query`.
    pub fn api_url(&self, query: &str) -> String {
        format!("{}/json?q={}", self.base_url, urlencoding::encode(query))
    }

    /// URL of the web page for `query`.
    pub fn web_url(&self, query: &str) -> String {
        format!("{}/?q={}", self.base_url, urlencoding::encode(query))
    }

    /// Searches for `query`, returning at most `limit` hits (clamped to 1..=20).
    pub async fn search(&self, query: &str, limit: usize) -> SearchResponse {
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        let web_url = self.web_url(query);

        match self.fetch(&self.api_url(query)).await {
            Ok(payload) => {
                let results = normalize_payload(&payload, limit, &web_url);
                debug!(query = query, count = results.len(), "Lemma search finished");
                SearchResponse {
                    query: query.to_string(),
                    count: results.len(),
                    results,
                    source: web_url,
                    error: None,
                }
            }
            Err(e) => {
                warn!(query = query, error = %e, "Lemma search failed");
                SearchResponse {
                    query: query.to_string(),
                    count: 0,
                    results: Vec::new(),
                    source: web_url,
                    error: Some(format!("Could not query Loogle API: {e}")),
                }
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<Value, SearchError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", "lean-forge/0.1")
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))
    }
}

impl Default for LemmaSearchClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalizes a Loogle payload into at most `limit` hits.
///
/// Accepts `{"hits": [...]}`, `{"results": [...]}` or a bare array. An empty
/// `hits` array falls through to `results`. Non-object items are skipped.
pub fn normalize_payload(payload: &Value, limit: usize, web_url: &str) -> Vec<SearchHit> {
    let items: &[Value] = match payload {
        Value::Object(map) => ["hits", "results"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_array))
            .find(|items| !items.is_empty())
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        Value::Array(items) => items.as_slice(),
        _ => &[],
    };

    items
        .iter()
        .take(limit)
        .filter(|item| item.is_object())
        .map(|item| SearchHit {
            name: first_string(item, &["name", "declName", "title"]),
            type_signature: first_string(item, &["type", "signature"]),
            doc: first_string(item, &["doc"]),
            source: first_string(item, &["source"]).unwrap_or_else(|| web_url.to_string()),
        })
        .collect()
}

fn first_string(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const WEB: &str = "https://loogle.lean-lang.org/?q=x";

    #[test]
    fn test_normalize_hits_object() {
        let payload = json!({
            "hits": [
                {"name": "Nat.add_assoc", "type": "(n m k : Nat) : _", "doc": "assoc"},
                {"name": "Nat.add_comm", "type": "(n m : Nat) : _", "doc": "comm"}
            ]
        });
        let hits = normalize_payload(&payload, 1, WEB);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name.as_deref(), Some("Nat.add_assoc"));
        assert_eq!(hits[0].type_signature.as_deref(), Some("(n m k : Nat) : _"));
        assert_eq!(hits[0].doc.as_deref(), Some("assoc"));
        assert_eq!(hits[0].source, WEB);
    }

    #[test]
    fn test_normalize_results_and_aliases() {
        let payload = json!({
            "hits": [],
            "results": [
                {"declName": "List.map_id", "signature": "map id l = l", "source": "Mathlib/List.lean"},
                {"title": "List.length_nil"}
            ]
        });
        let hits = normalize_payload(&payload, 5, WEB);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name.as_deref(), Some("List.map_id"));
        assert_eq!(hits[0].type_signature.as_deref(), Some("map id l = l"));
        assert_eq!(hits[0].source, "Mathlib/List.lean");
        assert_eq!(hits[1].name.as_deref(), Some("List.length_nil"));
        assert!(hits[1].doc.is_none());
    }

    #[test]
    fn test_normalize_bare_array() {
        let payload = json!([{"name": "a"}, {"name": "b"}, {"name": "c"}]);
        let hits = normalize_payload(&payload, 2, WEB);
        let names: Vec<_> = hits.iter().filter_map(|h| h.name.as_deref()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_normalize_unexpected_shapes() {
        assert!(normalize_payload(&json!("nope"), 5, WEB).is_empty());
        assert!(normalize_payload(&json!({"error": "bad query"}), 5, WEB).is_empty());
        assert_eq!(normalize_payload(&json!([1, {"name": "ok"}]), 5, WEB).len(), 1);
    }

    #[test]
    fn test_urls_are_encoded() {
        let client = LemmaSearchClient::with_base_url("http://localhost:1234/");
        assert_eq!(
            client.api_url("Nat.add _ _ = _"),
            "http://localhost:1234/json?q=Nat.add%20_%20_%20%3D%20_"
        );
        assert_eq!(client.web_url("a+b"), "http://localhost:1234/?q=a%2Bb");
    }

    #[tokio::test]
    async fn test_search_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.expect("read");
            let request = String::from_utf8_lossy(&buf[..n]).to_string();

            let body = r#"{"hits":[{"name":"Nat.add_assoc","type":"(n m k : Nat) : _","doc":"assoc"},{"name":"Nat.add_comm"}]}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.expect("write");
            request
        });

        let client = LemmaSearchClient::with_base_url(format!("http://{addr}"));
        let response = client.search("Nat.add_assoc", 1).await;
        let request = server.await.expect("server task");

        assert!(request.starts_with("GET /json?q=Nat.add_assoc "));
        assert!(response.error.is_none());
        assert_eq!(response.query, "Nat.add_assoc");
        assert_eq!(response.count, 1);
        assert_eq!(response.results[0].name.as_deref(), Some("Nat.add_assoc"));
    }

    #[tokio::test]
    async fn test_search_failure_is_reported_not_raised() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let client = LemmaSearchClient::with_base_url(format!("http://{addr}"));
        let response = client.search("anything", 50).await;

        assert_eq!(response.count, 0);
        assert!(response.results.is_empty());
        assert!(response.error.as_deref().is_some_and(|e| e.contains("Loogle")));
        let json: Value = serde_json::from_str(&response.to_json()).expect("json");
        assert!(json.get("error").is_some());
    }
}
