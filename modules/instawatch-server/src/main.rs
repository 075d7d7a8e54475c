use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use instagram_client::InstagramClient;
use instawatch_core::{
    Config, Endpoints, EventSink, MemoryCache, Mode, Poller, QuerySet, RealTimePoller, Resolver,
    TracingSink, Transport,
};

mod webhook;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    info!("instawatch starting...");

    let config = Config::from_env()?;
    config.log_redacted();

    let transport: Arc<dyn Transport> = Arc::new(InstagramClient::new()?);
    let sink: Arc<dyn EventSink> = Arc::new(TracingSink);

    match config.mode {
        Mode::RealTime => run_realtime(config, transport, sink).await,
        _ => run_polling(config, transport, sink).await,
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("instawatch=info".parse()?);
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

/// Usernames and places are looked up once, before polling begins.
async fn resolve_queries(config: &Config, transport: &dyn Transport) -> Result<QuerySet> {
    if !matches!(config.mode, Mode::User | Mode::Location) {
        return config.direct_queries();
    }

    let endpoints = Endpoints::new(
        &config.poller.api_base,
        &config.poller.client_id,
        &config.poller.client_secret,
        config.poller.page_size,
    )?;
    let cache = MemoryCache::new();
    let resolver = Resolver::new(transport, &endpoints, &cache);
    let queries = match config.mode {
        Mode::User => resolver.resolve_users(&config.queries).await,
        _ => resolver.resolve_locations(&config.queries).await,
    };
    info!(
        requested = config.queries.len(),
        resolved = queries.len(),
        "Resolved {} queries",
        config.mode
    );
    Ok(queries)
}

async fn run_polling(
    config: Config,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
) -> Result<()> {
    let queries = resolve_queries(&config, transport.as_ref()).await?;
    let poller = Arc::new(Poller::new(queries, transport, sink, config.poller.clone())?);
    poller.start().await;

    info!(
        interval_secs = config.poller.polling_interval.as_secs(),
        "Polling loop started"
    );
    polling_loop(poller, config.poller.polling_interval, shutdown_signal()).await;
    info!("Polling loop stopped");
    Ok(())
}

/// Poll once per tick until `shutdown` resolves. Shutdown stops the poller at
/// once; a sweep already running finishes its request and its result is dropped.
async fn polling_loop(
    poller: Arc<Poller>,
    interval: Duration,
    shutdown: impl Future<Output = ()> + Send + 'static,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut signalled = tokio::spawn({
        let poller = poller.clone();
        async move {
            shutdown.await;
            poller.stop();
        }
    });

    loop {
        tokio::select! {
            biased;
            _ = &mut signalled => break,
            _ = ticker.tick() => {}
        }
        // Failures are logged by the poller and retried next tick.
        let _ = poller.poll().await;
    }
    poller.stop();
}

async fn run_realtime(
    config: Config,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
) -> Result<()> {
    let queries = config.direct_queries()?;
    let poller = Arc::new(RealTimePoller::new(
        queries,
        transport,
        sink,
        config.poller.clone(),
        config.webhook.callback_url(),
    )?);

    let app = webhook::router(poller.clone(), &config.webhook.route());
    let addr = format!("{}:{}", config.webhook.host, config.webhook.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Webhook listener on {addr}, callback {}", poller.callback_url());

    // The API verifies the callback while a subscription is created, so the
    // listener has to be serving first.
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let created = poller.start().await?;
    info!(subscriptions = created, "Real-time polling active");

    server.await??;
    poller.stop().await;
    info!("Real-time poller stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use instagram_client::RawResponse;
    use serde_json::json;

    use instawatch_core::testing::{tag_page, MockSink, MockTransport, TEST_API_BASE};
    use instawatch_core::PollerConfig;

    /// Delays every request, so a shutdown can land mid-request.
    struct SlowTransport {
        inner: MockTransport,
        delay: Duration,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<RawResponse> {
            tokio::time::sleep(self.delay).await;
            self.inner.get(url, headers).await
        }

        async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<RawResponse> {
            tokio::time::sleep(self.delay).await;
            self.inner.post_form(url, form).await
        }

        async fn delete(&self, url: &str) -> Result<RawResponse> {
            tokio::time::sleep(self.delay).await;
            self.inner.delete(url).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_lets_in_flight_request_finish_and_drops_result() {
        let transport = Arc::new(SlowTransport {
            inner: MockTransport::new().on_get_json(
                "https://api.test/v1/tags/",
                tag_page(json!([{"id": "m1"}]), None, Some(20)),
            ),
            delay: Duration::from_secs(1),
        });
        let sink = Arc::new(MockSink::new());
        let config = PollerConfig {
            api_base: TEST_API_BASE.to_string(),
            client_id: "cid".to_string(),
            ..PollerConfig::default()
        };
        let poller = Arc::new(
            Poller::new(QuerySet::tags(["a"]), transport.clone(), sink.clone(), config).unwrap(),
        );
        poller.start().await;
        assert_eq!(transport.inner.gets().len(), 2);

        // Fires halfway through the first sweep request.
        let shutdown = tokio::time::sleep(Duration::from_millis(500));
        polling_loop(poller.clone(), Duration::from_secs(30), shutdown).await;

        assert!(poller.is_stopped());
        assert_eq!(transport.inner.gets().len(), 3);
        assert!(sink.items().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_polls_every_tick_until_shutdown() {
        let transport = Arc::new(
            MockTransport::new()
                .on_get_json("https://api.test/v1/tags/", tag_page(json!([]), None, Some(20))),
        );
        let config = PollerConfig {
            api_base: TEST_API_BASE.to_string(),
            client_id: "cid".to_string(),
            ..PollerConfig::default()
        };
        let poller = Arc::new(
            Poller::new(
                QuerySet::tags(["a"]),
                transport.clone(),
                Arc::new(MockSink::new()),
                config,
            )
            .unwrap(),
        );
        poller.start().await;

        // Ticks at 0s, 10s and 20s.
        let shutdown = tokio::time::sleep(Duration::from_secs(25));
        polling_loop(poller.clone(), Duration::from_secs(10), shutdown).await;

        assert!(poller.is_stopped());
        assert_eq!(transport.gets().len(), 2 + 3);
    }
}
