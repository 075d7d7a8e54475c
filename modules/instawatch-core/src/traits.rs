// Collaborator boundaries for the polling engine.
//
// Transport wraps the HTTP client; EventSink receives emitted items. Both are
// object-safe so tests can swap in MockTransport / MockSink.

use anyhow::Result;
use async_trait::async_trait;
use instagram_client::{InstagramClient, RawResponse};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET. Non-2xx statuses are returned, not raised.
    async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<RawResponse>;

    /// POST a url-encoded form (subscription creation).
    async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<RawResponse>;

    async fn delete(&self, url: &str) -> Result<RawResponse>;
}

#[async_trait]
impl Transport for InstagramClient {
    async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<RawResponse> {
        Ok(self.get(url, headers).await?)
    }

    async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<RawResponse> {
        Ok(self.post_form(url, form).await?)
    }

    async fn delete(&self, url: &str) -> Result<RawResponse> {
        Ok(self.delete(url).await?)
    }
}
