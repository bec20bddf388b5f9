//! Off-chain HTTP sources (protocol API supplies, LP pool listings).

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use crate::error::{CollectorError, CollectorResult};

#[async_trait]
pub trait ExternalSource: Send + Sync {
    /// Raw response body of a GET request.
    async fn fetch_text(&self, url: &str) -> CollectorResult<String>;

    async fn fetch_json(&self, url: &str) -> CollectorResult<Value> {
        let body = self.fetch_text(url).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> CollectorResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ExternalSource for HttpSource {
    async fn fetch_text(&self, url: &str) -> CollectorResult<String> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::transport(format!("{} returned {}", url, status)));
        }

        Ok(response.text().await?)
    }
}
