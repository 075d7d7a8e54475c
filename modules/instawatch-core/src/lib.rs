pub mod coalescer;
pub mod config;
pub mod dedup;
pub mod endpoint;
pub mod error;
pub mod freshness;
pub mod item;
pub mod normalize;
pub mod pager;
pub mod poller;
pub mod query;
pub mod realtime;
pub mod resolve;
pub mod scheduler;
pub mod sink;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use coalescer::{TriggerCoalescer, TriggerDecision};
pub use config::{Config, Mode, PollerConfig, WebhookConfig};
pub use endpoint::Endpoints;
pub use error::{PollError, Result};
pub use freshness::{FreshnessTracker, QueryState, Watermark};
pub use item::NormalizedItem;
pub use pager::SweepReport;
pub use poller::Poller;
pub use query::{Query, QuerySet, Radius};
pub use realtime::RealTimePoller;
pub use resolve::{MemoryCache, ResolutionCache, Resolver};
pub use sink::{ChannelSink, EmittedBatch, EventSink, TracingSink};
pub use traits::Transport;
