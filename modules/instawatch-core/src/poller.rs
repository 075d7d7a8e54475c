use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::PollerConfig;
use crate::dedup::Deduplicator;
use crate::endpoint::Endpoints;
use crate::error::{PollError, Result};
use crate::freshness::{FreshnessTracker, QueryState, Watermark};
use crate::pager::{Pager, SweepReport};
use crate::query::QuerySet;
use crate::scheduler::RoundRobin;
use crate::sink::EventSink;
use crate::traits::Transport;

/// Everything a sweep mutates. Guarded by the single sweep lock.
pub(crate) struct PollState {
    pub(crate) tracker: FreshnessTracker,
    pub(crate) dedup: Deduplicator,
    pub(crate) rotation: RoundRobin,
    pub(crate) warmed: bool,
}

/// The polling engine: one sweep at a time across a fixed set of queries.
///
/// `poll` serves the round-robin's current query and advances it when the
/// sweep completes; `poll_query` serves a fixed index and leaves the rotation
/// alone (the real-time path).
pub struct Poller {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
    endpoints: Endpoints,
    config: PollerConfig,
    pub(crate) state: Mutex<PollState>,
    stopped: AtomicBool,
}

impl Poller {
    pub fn new(
        queries: QuerySet,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn EventSink>,
        config: PollerConfig,
    ) -> Result<Self> {
        if queries.is_empty() {
            return Err(PollError::Config("at least one query is required".to_string()));
        }
        let endpoints = Endpoints::new(
            &config.api_base,
            &config.client_id,
            &config.client_secret,
            config.page_size,
        )?;
        let seed = config.timestamp_seed(Utc::now());
        let state = PollState {
            tracker: FreshnessTracker::new(&queries, seed),
            dedup: Deduplicator::new(queries.len()),
            rotation: RoundRobin::new(queries.len()),
            warmed: false,
        };

        Ok(Self {
            transport,
            sink,
            endpoints,
            config,
            state: Mutex::new(state),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Initialize every query's watermark before any sweep is served.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        self.warm_up(&mut state).await;
    }

    pub(crate) async fn warm_up(&self, state: &mut PollState) {
        let mut initialized = 0usize;
        for index in 0..state.tracker.len() {
            if state
                .tracker
                .initialize(index, self.transport(), &self.endpoints)
                .await
                .is_ok()
            {
                initialized += 1;
            }
        }
        state.warmed = true;
        info!(
            queries = state.tracker.len(),
            initialized, "Watermarks initialized"
        );
    }

    /// Sweep the current query, then rotate to the next one.
    ///
    /// On failure the rotation stays put so the next call retries the same
    /// query, unless the failure classifies as "skip this query".
    pub async fn poll(&self) -> Result<SweepReport> {
        self.ensure_running()?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if !state.warmed {
            self.warm_up(state).await;
        }

        let index = state.rotation.current();
        let outcome = self
            .pager()
            .sweep(&mut state.tracker, &mut state.dedup, index)
            .await;

        match &outcome {
            Ok(report) => {
                let next = state.rotation.advance();
                debug!(index, next, pages = report.pages, emitted = report.emitted, "Sweep done");
            }
            Err(e) if e.is_skippable(&self.config.skip_error_types) => {
                let next = state.rotation.advance();
                info!(index, next, error = %e, "Skipping query the API refuses to serve");
            }
            Err(PollError::Stopped) => {}
            Err(e) => {
                warn!(index, error = %e, "Sweep aborted, will retry next cycle");
            }
        }
        outcome
    }

    /// Sweep a specific query without touching the rotation.
    pub async fn poll_query(&self, index: usize) -> Result<SweepReport> {
        self.ensure_running()?;
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let outcome = self
            .pager()
            .sweep(&mut state.tracker, &mut state.dedup, index)
            .await;
        match &outcome {
            Ok(report) => debug!(index, pages = report.pages, emitted = report.emitted, "Sweep done"),
            Err(PollError::Stopped) => {}
            Err(e) => warn!(index, error = %e, "Sweep aborted"),
        }
        outcome
    }

    /// Refuse new sweeps and discard the result of any request still in flight.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub async fn current_index(&self) -> usize {
        self.state.lock().await.rotation.current()
    }

    pub async fn query_count(&self) -> usize {
        self.state.lock().await.tracker.len()
    }

    pub async fn watermark(&self, index: usize) -> Option<Watermark> {
        self.state.lock().await.tracker.get(index)
    }

    /// Snapshot of one query's state.
    pub async fn query_state(&self, index: usize) -> Option<QueryState> {
        self.state.lock().await.tracker.state(index).cloned()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_stopped() {
            Err(PollError::Stopped)
        } else {
            Ok(())
        }
    }

    fn pager(&self) -> Pager<'_> {
        Pager {
            transport: self.transport.as_ref(),
            sink: self.sink.as_ref(),
            endpoints: &self.endpoints,
            page_cap: self.config.effective_page_cap(),
            stopped: &self.stopped,
        }
    }
}
