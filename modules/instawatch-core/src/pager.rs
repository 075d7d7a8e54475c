use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, info_span, warn, Instrument};

use crate::dedup::Deduplicator;
use crate::endpoint::Endpoints;
use crate::error::{PollError, Result};
use crate::freshness::{retain_fresh, FreshnessTracker, Watermark};
use crate::normalize::{normalize, Page};
use crate::query::{Flavor, Query};
use crate::sink::EventSink;
use crate::traits::Transport;

/// Outcome of one completed sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub index: usize,
    /// Pages fetched, including the first.
    pub pages: u32,
    /// Items handed to the sink after filtering.
    pub emitted: usize,
    /// Paging stopped because the page cap was reached.
    pub capped: bool,
    /// The first request came back 304.
    pub not_modified: bool,
}

/// Drives one query's request → normalize → next-page loop.
pub(crate) struct Pager<'a> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) sink: &'a dyn EventSink,
    pub(crate) endpoints: &'a Endpoints,
    pub(crate) page_cap: Option<u32>,
    pub(crate) stopped: &'a AtomicBool,
}

impl Pager<'_> {
    /// Run one sweep for `index`. The caller holds the sweep lock.
    pub(crate) async fn sweep(
        &self,
        tracker: &mut FreshnessTracker,
        dedup: &mut Deduplicator,
        index: usize,
    ) -> Result<SweepReport> {
        let query = tracker
            .state(index)
            .map(|s| s.query().clone())
            .ok_or_else(|| PollError::Config(format!("no query at index {index}")))?;

        let span = info_span!("sweep", index, query = %query);
        async {
            if tracker.get(index).is_none() {
                // Sweeps still run without a watermark; the next sweep retries initialization.
                if let Err(e) = tracker.initialize(index, self.transport, self.endpoints).await {
                    debug!(error = %e, "Sweeping without a watermark");
                }
            }

            let pending = match tracker.state_mut(index) {
                Some(state) => {
                    state.begin_sweep();
                    state.pending_watermark()
                }
                None => None,
            };

            let mut report = SweepReport {
                index,
                ..SweepReport::default()
            };
            let outcome = self
                .drain(tracker, dedup, index, &query, pending, &mut report)
                .await;

            if let Some(state) = tracker.state_mut(index) {
                state.finish_sweep();
            }
            outcome.map(|()| report)
        }
        .instrument(span)
        .await
    }

    async fn drain(
        &self,
        tracker: &mut FreshnessTracker,
        dedup: &mut Deduplicator,
        index: usize,
        query: &Query,
        pending: Option<Watermark>,
        report: &mut SweepReport,
    ) -> Result<()> {
        let mut url = self.endpoints.recent_media(query, pending);

        loop {
            let first_page = report.pages == 0;
            let headers = match tracker.state_mut(index) {
                Some(state) => {
                    state.record_page(&url);
                    if first_page {
                        state.conditional_headers()
                    } else {
                        Vec::new()
                    }
                }
                None => Vec::new(),
            };
            report.pages += 1;
            info!(page = report.pages, %url, "{}", if first_page { "Polling" } else { "Paging" });

            let resp = self
                .transport
                .get(&url, &headers)
                .await
                .map_err(|e| PollError::Transport(e.to_string()))?;

            if self.stopped.load(Ordering::SeqCst) {
                debug!("Poller stopped during request, discarding response");
                return Err(PollError::Stopped);
            }

            if resp.is_not_modified() {
                debug!("Not modified since last poll");
                report.not_modified = first_page;
                return Ok(());
            }
            if !resp.is_ok() {
                let meta = resp.meta().unwrap_or_default();
                return Err(PollError::HttpStatus {
                    status: resp.status,
                    error_type: meta.error_type,
                    message: meta.error_message,
                });
            }
            if first_page {
                if let Some(state) = tracker.state_mut(index) {
                    state.remember_validators(resp.header("etag"), resp.header("last-modified"));
                }
            }

            let Page {
                items,
                next_url,
                watermark,
            } = normalize(&resp.body, query.flavor())?;

            let items = match query.flavor() {
                Flavor::TagCursor => items,
                Flavor::Timestamp => retain_fresh(items, pending),
            };
            if let Some(candidate) = watermark {
                tracker.update(index, candidate);
            }

            dedup.begin_sweep(index, first_page);
            let items = dedup.filter(index, items);
            info!(count = items.len(), "Created new media items");
            if !items.is_empty() {
                report.emitted += items.len();
                self.sink
                    .emit(index, items)
                    .await
                    .map_err(|e| PollError::Sink(e.to_string()))?;
            }

            let Some(next) = next_url else {
                return Ok(());
            };
            if let Some(cap) = self.page_cap {
                if report.pages >= cap {
                    warn!(pages = report.pages, cap, "Safe mode: query is paging too many times");
                    report.capped = true;
                    return Ok(());
                }
            }
            url = self.endpoints.next_page(&next, query, pending)?;
        }
    }
}
