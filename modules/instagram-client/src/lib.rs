pub mod error;
pub mod types;

pub use error::{InstagramError, Result};
pub use types::{
    id_to_string, Envelope, ErrorEnvelope, LocationSummary, Meta, RawResponse,
    SubscriptionCreated, SubscriptionRequest, UserSummary,
};

use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.instagram.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw HTTP access to the Instagram REST API.
///
/// Every call returns the response whatever its status; interpreting
/// status codes and bodies is the caller's job.
#[derive(Clone)]
pub struct InstagramClient {
    client: reqwest::Client,
}

impl InstagramClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    pub async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<RawResponse> {
        let mut req = self.client.get(url);
        for (name, value) in headers {
            req = req.header(*name, value.as_str());
        }
        let resp = req.send().await?;
        let raw = into_raw(resp).await?;
        tracing::debug!(url, status = raw.status, "GET");
        Ok(raw)
    }

    pub async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<RawResponse> {
        let resp = self.client.post(url).form(form).send().await?;
        let raw = into_raw(resp).await?;
        tracing::debug!(url, status = raw.status, "POST");
        Ok(raw)
    }

    pub async fn delete(&self, url: &str) -> Result<RawResponse> {
        let resp = self.client.delete(url).send().await?;
        let raw = into_raw(resp).await?;
        tracing::debug!(url, status = raw.status, "DELETE");
        Ok(raw)
    }
}

async fn into_raw(resp: reqwest::Response) -> Result<RawResponse> {
    let status = resp.status().as_u16();
    let headers: HashMap<String, String> = resp
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();
    let body = resp.text().await?;
    Ok(RawResponse {
        status,
        headers,
        body,
    })
}
