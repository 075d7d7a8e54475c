use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::endpoint::Endpoints;
use crate::error::{PollError, Result};
use crate::item::NormalizedItem;
use crate::query::{Flavor, Query, QuerySet};
use crate::traits::Transport;

/// A freshness cursor: a `min_tag_id` for tag queries, unix seconds otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(u64);

impl Watermark {
    pub const ZERO: Watermark = Watermark(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// Cursor values arrive as JSON numbers or numeric strings.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(Self),
            Value::String(s) => s.trim().parse().ok().map(Self),
            _ => None,
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Polling state for one query index.
#[derive(Debug, Clone)]
pub struct QueryState {
    query: Query,
    watermark: Option<Watermark>,
    /// Watermark the in-flight sweep was built from; frozen until the sweep ends.
    pending_watermark: Option<Watermark>,
    current_page_url: Option<String>,
    page_count: u32,
    etag: Option<String>,
    last_modified: Option<String>,
}

impl QueryState {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            watermark: None,
            pending_watermark: None,
            current_page_url: None,
            page_count: 0,
            etag: None,
            last_modified: None,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn watermark(&self) -> Option<Watermark> {
        self.watermark
    }

    pub fn pending_watermark(&self) -> Option<Watermark> {
        self.pending_watermark
    }

    pub fn current_page_url(&self) -> Option<&str> {
        self.current_page_url.as_deref()
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Move the watermark forward iff `candidate` is strictly larger. Absent sorts lowest.
    pub fn advance(&mut self, candidate: Watermark) -> bool {
        if Some(candidate) > self.watermark {
            self.watermark = Some(candidate);
            true
        } else {
            false
        }
    }

    pub(crate) fn begin_sweep(&mut self) {
        self.pending_watermark = self.watermark;
        self.current_page_url = None;
        self.page_count = 0;
    }

    pub(crate) fn record_page(&mut self, url: &str) {
        self.page_count += 1;
        self.current_page_url = Some(url.to_string());
    }

    pub(crate) fn finish_sweep(&mut self) {
        self.current_page_url = None;
        self.page_count = 0;
    }

    pub(crate) fn conditional_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(etag) = &self.etag {
            headers.push(("If-None-Match", etag.clone()));
        }
        if let Some(modified) = &self.last_modified {
            headers.push(("If-Modified-Since", modified.clone()));
        }
        headers
    }

    pub(crate) fn remember_validators(&mut self, etag: Option<&str>, last_modified: Option<&str>) {
        self.etag = etag.map(String::from);
        self.last_modified = last_modified.map(String::from);
    }
}

/// Per-query watermarks, stored as one record per query index.
#[derive(Debug, Clone)]
pub struct FreshnessTracker {
    states: Vec<QueryState>,
    timestamp_seed: Watermark,
}

impl FreshnessTracker {
    /// Timestamp queries start at `timestamp_seed` (now minus lookback); tag
    /// queries start absent and must be initialized against the API.
    pub fn new(queries: &QuerySet, timestamp_seed: Watermark) -> Self {
        let states = queries
            .iter()
            .map(|q| {
                let mut state = QueryState::new(q.clone());
                if q.flavor() == Flavor::Timestamp {
                    state.advance(timestamp_seed);
                }
                state
            })
            .collect();
        Self {
            states,
            timestamp_seed,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Watermark> {
        self.states.get(index).and_then(|s| s.watermark)
    }

    pub fn state(&self, index: usize) -> Option<&QueryState> {
        self.states.get(index)
    }

    pub(crate) fn state_mut(&mut self, index: usize) -> Option<&mut QueryState> {
        self.states.get_mut(index)
    }

    /// Returns whether the watermark moved. Idempotent for repeated candidates.
    pub fn update(&mut self, index: usize, candidate: Watermark) -> bool {
        let Some(state) = self.states.get_mut(index) else {
            return false;
        };
        let moved = state.advance(candidate);
        if moved {
            debug!(index, query = %state.query, watermark = %candidate, "Watermark advanced");
        }
        moved
    }

    /// Establish the watermark for `index`.
    ///
    /// Tag queries probe the API twice: once with `min_tag_id=0` to learn the
    /// current cursor, then again with that cursor, because the first reported
    /// value is not reliable. On failure an existing watermark is kept as is.
    pub async fn initialize(
        &mut self,
        index: usize,
        transport: &dyn Transport,
        endpoints: &Endpoints,
    ) -> Result<Watermark> {
        let Some(state) = self.states.get(index) else {
            return Err(PollError::Config(format!("no query at index {index}")));
        };
        let query = state.query.clone();

        if query.flavor() == Flavor::Timestamp {
            let seed = self.timestamp_seed;
            self.update(index, seed);
            return Ok(self.get(index).unwrap_or(seed));
        }

        match probe_cursor(&query, transport, endpoints).await {
            Ok(cursor) => {
                self.update(index, cursor);
                let watermark = self.get(index).unwrap_or(cursor);
                debug!(index, %query, %watermark, "Initialized watermark");
                Ok(watermark)
            }
            Err(e) => {
                warn!(index, %query, error = %e, "Failed to initialize watermark");
                Err(PollError::WatermarkUnavailable(query.to_string()))
            }
        }
    }
}

async fn probe_cursor(
    query: &Query,
    transport: &dyn Transport,
    endpoints: &Endpoints,
) -> Result<Watermark> {
    let first_url = endpoints.recent_media(query, Some(Watermark::ZERO));
    let first = probe_pagination(transport, &first_url).await?.ok_or_else(|| {
        PollError::MalformedResponse("pagination.min_tag_id missing from probe".to_string())
    })?;

    let second_url = endpoints.recent_media(query, Some(first));
    let second = probe_pagination(transport, &second_url).await?;
    Ok(second.map_or(first, |s| s.max(first)))
}

async fn probe_pagination(transport: &dyn Transport, url: &str) -> Result<Option<Watermark>> {
    let resp = transport
        .get(url, &[])
        .await
        .map_err(|e| PollError::Transport(e.to_string()))?;
    if !resp.is_ok() {
        let meta = resp.meta().unwrap_or_default();
        return Err(PollError::HttpStatus {
            status: resp.status,
            error_type: meta.error_type,
            message: meta.error_message,
        });
    }
    let body: Value = resp
        .json()
        .map_err(|e| PollError::MalformedResponse(e.to_string()))?;
    let pagination = body
        .get("pagination")
        .and_then(Value::as_object)
        .ok_or_else(|| PollError::MalformedResponse("pagination missing".to_string()))?;
    Ok(pagination.get("min_tag_id").and_then(Watermark::from_json))
}

/// Newest `created_time` among `items`.
pub fn newest_created(items: &[NormalizedItem]) -> Option<Watermark> {
    items
        .iter()
        .filter_map(NormalizedItem::created_time)
        .max()
        .map(Watermark::new)
}

/// Drop items not strictly newer than `since`. Items without a timestamp are kept.
pub fn retain_fresh(items: Vec<NormalizedItem>, since: Option<Watermark>) -> Vec<NormalizedItem> {
    let Some(since) = since else {
        return items;
    };
    items
        .into_iter()
        .filter(|item| match item.created_time() {
            Some(ts) => ts > since.value(),
            None => true,
        })
        .collect()
}
