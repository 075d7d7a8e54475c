// Test mocks for the polling engine.
//
// Two mocks matching the two trait boundaries:
// - MockTransport (Transport): URL-prefix routes with scripted replies
// - MockSink (EventSink): records every emitted batch
//
// Plus helpers for building API-shaped response bodies.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use instagram_client::RawResponse;
use serde_json::{json, Value};

use crate::item::NormalizedItem;
use crate::sink::{EmittedBatch, EventSink};
use crate::traits::Transport;

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

#[derive(Debug, Clone)]
pub enum Reply {
    Response(RawResponse),
    Fail(String),
}

/// One request the mock served (or refused).
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
}

struct Route {
    method: Method,
    prefix: String,
    replies: VecDeque<Reply>,
}

/// Scripted transport. Routes match by URL prefix, longest first. Each route
/// plays its replies in order; the last one repeats forever.
/// Builder pattern: `.on_get()`, `.on_get_json()`, `.fail_get()`, `.on_post()`, `.on_delete()`.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_get(self, prefix: &str, response: RawResponse) -> Self {
        self.push(Method::Get, prefix, Reply::Response(response))
    }

    pub fn on_get_json(self, prefix: &str, body: Value) -> Self {
        self.on_get(prefix, json_response(200, body))
    }

    pub fn fail_get(self, prefix: &str, message: &str) -> Self {
        self.push(Method::Get, prefix, Reply::Fail(message.to_string()))
    }

    pub fn on_post(self, prefix: &str, response: RawResponse) -> Self {
        self.push(Method::Post, prefix, Reply::Response(response))
    }

    pub fn on_delete(self, prefix: &str, response: RawResponse) -> Self {
        self.push(Method::Delete, prefix, Reply::Response(response))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// URLs of every GET, in order.
    pub fn gets(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == Method::Get)
            .map(|r| r.url)
            .collect()
    }

    pub fn count(&self, method: Method, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.url.starts_with(prefix))
            .count()
    }

    fn push(mut self, method: Method, prefix: &str, reply: Reply) -> Self {
        let routes = self.routes.get_mut().unwrap();
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.prefix == prefix)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                prefix: prefix.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    fn serve(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, String)],
        form: &[(&str, String)],
    ) -> Result<RawResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            url: url.to_string(),
            headers: owned(headers),
            form: owned(form),
        });

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .filter(|r| r.method == method && url.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len())
            .ok_or_else(|| anyhow!("MockTransport: no {method:?} route registered for {url}"))?;

        let reply = if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        };
        match reply {
            Some(Reply::Response(resp)) => Ok(resp),
            Some(Reply::Fail(message)) => bail!("{message}"),
            None => bail!("MockTransport: route for {url} has no replies"),
        }
    }
}

fn owned(pairs: &[(&str, String)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<RawResponse> {
        self.serve(Method::Get, url, headers, &[])
    }

    async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<RawResponse> {
        self.serve(Method::Post, url, &[], form)
    }

    async fn delete(&self, url: &str) -> Result<RawResponse> {
        self.serve(Method::Delete, url, &[], &[])
    }
}

// ---------------------------------------------------------------------------
// MockSink
// ---------------------------------------------------------------------------

/// Records batches. `failing()` rejects every batch instead.
#[derive(Default)]
pub struct MockSink {
    batches: Mutex<Vec<EmittedBatch>>,
    fail: bool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn batches(&self) -> Vec<EmittedBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn items(&self) -> Vec<NormalizedItem> {
        self.batches()
            .into_iter()
            .flat_map(|b| b.items)
            .collect()
    }

    /// Ids of every emitted item, in emission order.
    pub fn ids(&self) -> Vec<String> {
        self.items().iter().filter_map(NormalizedItem::id).collect()
    }
}

#[async_trait]
impl EventSink for MockSink {
    async fn emit(&self, query_index: usize, items: Vec<NormalizedItem>) -> Result<()> {
        if self.fail {
            bail!("MockSink: rejecting batch for query {query_index}");
        }
        self.batches
            .lock()
            .unwrap()
            .push(EmittedBatch { query_index, items });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

pub const TEST_API_BASE: &str = "https://api.test/v1";

pub fn json_response(status: u16, body: Value) -> RawResponse {
    RawResponse::new(status, body.to_string())
}

/// `{"data": items, "pagination": {...}}` for a tag endpoint.
pub fn tag_page(items: Value, next_url: Option<&str>, min_tag_id: Option<u64>) -> Value {
    let mut pagination = serde_json::Map::new();
    if let Some(next) = next_url {
        pagination.insert("next_url".to_string(), json!(next));
    }
    if let Some(cursor) = min_tag_id {
        pagination.insert("min_tag_id".to_string(), json!(cursor.to_string()));
    }
    json!({ "data": items, "pagination": pagination })
}

/// An error response carrying `meta.error_type`.
pub fn api_error(status: u16, error_type: &str) -> RawResponse {
    json_response(
        status,
        json!({
            "meta": {
                "code": status,
                "error_type": error_type,
                "error_message": "test error"
            }
        }),
    )
}
