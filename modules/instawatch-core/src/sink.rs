use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::item::NormalizedItem;

/// Downstream consumer of emitted items. Order within one batch is page order.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, query_index: usize, items: Vec<NormalizedItem>) -> Result<()>;
}

/// Writes each item as one JSON line through `tracing`.
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn emit(&self, query_index: usize, items: Vec<NormalizedItem>) -> Result<()> {
        for item in &items {
            let line = serde_json::to_string(item)?;
            info!(target: "instawatch::items", index = query_index, item = %line, "media item");
        }
        Ok(())
    }
}

/// A batch of items emitted by one page of one query.
#[derive(Debug, Clone)]
pub struct EmittedBatch {
    pub query_index: usize,
    pub items: Vec<NormalizedItem>,
}

/// Forwards batches over a bounded channel.
pub struct ChannelSink {
    tx: mpsc::Sender<EmittedBatch>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EmittedBatch>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, query_index: usize, items: Vec<NormalizedItem>) -> Result<()> {
        self.tx
            .send(EmittedBatch { query_index, items })
            .await
            .map_err(|_| anyhow::anyhow!("item channel closed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn channel_sink_forwards_batches_in_order() {
        let (sink, mut rx) = ChannelSink::new(4);
        let items = vec![
            NormalizedItem::from_value(json!({"id": "1"})),
            NormalizedItem::from_value(json!({"id": "2"})),
        ];
        sink.emit(3, items).await.unwrap();

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.query_index, 3);
        let ids: Vec<String> = batch.items.iter().filter_map(|i| i.id()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn channel_sink_errors_when_receiver_dropped() {
        let (sink, rx) = ChannelSink::new(1);
        drop(rx);
        assert!(sink.emit(0, vec![]).await.is_err());
    }
}
