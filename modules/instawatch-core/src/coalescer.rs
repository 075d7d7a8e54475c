use std::collections::HashMap;

use tokio::task::AbortHandle;

use crate::error::{PollError, Result};

/// What happened to a webhook trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// No follow-up poll was pending: poll now and arm one.
    Poll { index: usize },
    /// A follow-up poll is already armed for this query; the trigger is dropped.
    Coalesced { index: usize },
}

/// Subscription → query index mapping plus the "follow-up poll armed" marker per query.
///
/// At most one armed follow-up exists per query index at any time.
#[derive(Debug, Default)]
pub struct TriggerCoalescer {
    subscriptions: HashMap<u64, usize>,
    scheduled: Vec<Option<AbortHandle>>,
}

impl TriggerCoalescer {
    pub fn new(query_count: usize) -> Self {
        Self {
            subscriptions: HashMap::new(),
            scheduled: (0..query_count).map(|_| None).collect(),
        }
    }

    pub fn register(&mut self, subscription_id: u64, index: usize) {
        self.subscriptions.insert(subscription_id, index);
    }

    pub fn index_of(&self, subscription_id: u64) -> Result<usize> {
        self.subscriptions
            .get(&subscription_id)
            .copied()
            .ok_or(PollError::UnknownSubscription(subscription_id))
    }

    pub fn subscription_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.subscriptions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn forget_subscriptions(&mut self) {
        self.subscriptions.clear();
    }

    pub fn is_scheduled(&self, index: usize) -> bool {
        self.scheduled.get(index).is_some_and(Option::is_some)
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.iter().filter(|s| s.is_some()).count()
    }

    /// Decide what a trigger for `subscription_id` should do. Does not arm anything.
    pub fn decide(&self, subscription_id: u64) -> Result<TriggerDecision> {
        let index = self.index_of(subscription_id)?;
        if self.is_scheduled(index) {
            Ok(TriggerDecision::Coalesced { index })
        } else {
            Ok(TriggerDecision::Poll { index })
        }
    }

    /// Record the armed follow-up for `index`.
    pub fn arm(&mut self, index: usize, handle: AbortHandle) {
        if let Some(slot) = self.scheduled.get_mut(index) {
            *slot = Some(handle);
        }
    }

    /// The follow-up for `index` fired; a new trigger may arm another.
    pub fn release(&mut self, index: usize) {
        if let Some(slot) = self.scheduled.get_mut(index) {
            *slot = None;
        }
    }

    /// Abort every armed follow-up. Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for slot in &mut self.scheduled {
            if let Some(handle) = slot.take() {
                handle.abort();
                cancelled += 1;
            }
        }
        cancelled
    }
}
