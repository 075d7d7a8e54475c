use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use instagram_client::{Envelope, SubscriptionCreated, SubscriptionRequest};
use tracing::{debug, info, warn};

use crate::coalescer::{TriggerCoalescer, TriggerDecision};
use crate::config::PollerConfig;
use crate::error::{PollError, Result};
use crate::pager::SweepReport;
use crate::poller::Poller;
use crate::query::{Query, QuerySet};
use crate::sink::EventSink;
use crate::traits::Transport;

/// Webhook-driven variant: the API notifies a subscription id, we poll that
/// subscription's tag now and once more after `polling_interval`.
///
/// Sweeps share the poller's lock. Coalescing bookkeeping sits behind its
/// own short-lived lock so checking or arming a follow-up never waits on HTTP.
pub struct RealTimePoller {
    poller: Arc<Poller>,
    tags: Vec<String>,
    coalescer: Mutex<TriggerCoalescer>,
    interval: Duration,
    callback_url: String,
}

impl RealTimePoller {
    pub fn new(
        queries: QuerySet,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn EventSink>,
        config: PollerConfig,
        callback_url: impl Into<String>,
    ) -> Result<Self> {
        let tags = queries
            .iter()
            .map(|q| match q {
                Query::Tag(tag) => Ok(tag.clone()),
                other => Err(PollError::Config(format!(
                    "real-time subscriptions only support tags, got {other}"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;
        let interval = config.polling_interval;
        let poller = Poller::new(queries, transport, sink, config)?;

        Ok(Self {
            poller: Arc::new(poller),
            coalescer: Mutex::new(TriggerCoalescer::new(tags.len())),
            tags,
            interval,
            callback_url: callback_url.into(),
        })
    }

    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Initialize every watermark, then register one subscription per tag.
    /// Both happen under the sweep lock so no trigger is served half-way.
    /// Returns how many subscriptions were created.
    pub async fn start(&self) -> Result<usize> {
        if self.poller.is_stopped() {
            return Err(PollError::Stopped);
        }
        let mut state = self.poller.state.lock().await;
        self.poller.warm_up(&mut state).await;

        let mut created = 0;
        for (index, tag) in self.tags.iter().enumerate() {
            match self.create_subscription(tag).await {
                Ok(subscription_id) => {
                    self.coalescer().register(subscription_id, index);
                    info!(subscription_id, index, tag = %tag, "Subscription created");
                    created += 1;
                }
                Err(e) => warn!(index, tag = %tag, error = %e, "Failed to create subscription"),
            }
        }
        Ok(created)
    }

    async fn create_subscription(&self, tag: &str) -> Result<u64> {
        let endpoints = self.poller.endpoints();
        let request = SubscriptionRequest::tag_media(
            endpoints.client_id(),
            endpoints.client_secret(),
            tag,
            &self.callback_url,
        );
        let resp = self
            .poller
            .transport()
            .post_form(&endpoints.subscriptions(), &request.as_form())
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
        let created: Envelope<SubscriptionCreated> = resp
            .json()
            .map_err(|e| PollError::MalformedResponse(e.to_string()))?;
        created
            .data
            .subscription_id()
            .ok_or_else(|| PollError::MalformedResponse("subscription id missing".to_string()))
    }

    /// Webhook entry point. Never waits on the network: the immediate poll and
    /// the follow-up both run on their own tasks.
    pub fn on_trigger(self: &Arc<Self>, subscription_id: u64) -> Result<TriggerDecision> {
        if self.poller.is_stopped() {
            return Err(PollError::Stopped);
        }
        let mut coalescer = self.coalescer();
        let decision = coalescer.decide(subscription_id)?;

        match decision {
            TriggerDecision::Poll { index } => {
                let this = Arc::clone(self);
                let follow_up = tokio::spawn(async move {
                    tokio::time::sleep(this.interval).await;
                    // Outcome is logged by the poller.
                    let _ = this.on_scheduled_fire(index).await;
                });
                coalescer.arm(index, follow_up.abort_handle());
                drop(coalescer);

                let this = Arc::clone(self);
                tokio::spawn(async move {
                    let _ = this.poller.poll_query(index).await;
                });
                debug!(subscription_id, index, "Trigger accepted, follow-up armed");
            }
            TriggerDecision::Coalesced { index } => {
                debug!(subscription_id, index, "Follow-up already armed, trigger dropped");
            }
        }
        Ok(decision)
    }

    /// `on_trigger`, plus cleanup of subscriptions we no longer know about.
    pub fn handle_trigger(self: &Arc<Self>, subscription_id: u64) -> Result<TriggerDecision> {
        let outcome = self.on_trigger(subscription_id);
        if let Err(PollError::UnknownSubscription(id)) = &outcome {
            warn!(subscription_id = id, "Trigger for unknown subscription, deleting it");
            let this = Arc::clone(self);
            let id = *id;
            tokio::spawn(async move {
                if let Err(e) = this.delete_subscription(id).await {
                    warn!(subscription_id = id, error = %e, "Failed to delete subscription");
                }
            });
        }
        outcome
    }

    /// The armed follow-up fired: clear the marker, then poll.
    pub async fn on_scheduled_fire(&self, index: usize) -> Result<SweepReport> {
        self.coalescer().release(index);
        self.poller.poll_query(index).await
    }

    pub async fn delete_subscription(&self, subscription_id: u64) -> Result<()> {
        let url = self.poller.endpoints().delete_subscription(subscription_id);
        let resp = self
            .poller
            .transport()
            .delete(&url)
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
        info!(subscription_id, "Subscription deleted");
        Ok(())
    }

    /// Stop serving triggers, cancel armed follow-ups, then tear down subscriptions.
    pub async fn stop(&self) {
        self.poller.stop();
        let (cancelled, subscriptions) = {
            let mut coalescer = self.coalescer();
            let cancelled = coalescer.cancel_all();
            let ids = coalescer.subscription_ids();
            coalescer.forget_subscriptions();
            (cancelled, ids)
        };
        info!(cancelled, subscriptions = subscriptions.len(), "Stopping real-time poller");

        for subscription_id in subscriptions {
            if let Err(e) = self.delete_subscription(subscription_id).await {
                warn!(subscription_id, error = %e, "Failed to delete subscription");
            }
        }
    }

    pub fn is_scheduled(&self, index: usize) -> bool {
        self.coalescer().is_scheduled(index)
    }

    pub fn scheduled_count(&self) -> usize {
        self.coalescer().scheduled_count()
    }

    pub fn subscription_ids(&self) -> Vec<u64> {
        self.coalescer().subscription_ids()
    }

    fn coalescer(&self) -> MutexGuard<'_, TriggerCoalescer> {
        self.coalescer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
