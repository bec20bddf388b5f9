use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::ChainSettings;
use crate::error::{CollectorError, CollectorResult};

/// Contract metadata as reported by the chain explorer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractMetadata {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Number of executed messages against the contract
    #[serde(default)]
    pub executes: Option<u64>,
}

/// Opaque request/response transport to the chain.
///
/// `query_contract_state` returns the base64 envelope of a CosmWasm smart query;
/// decoding is left to [`ContractQuerier`](super::ContractQuerier).
#[async_trait]
pub trait ChainTransport: Send + Sync {
    async fn query_contract_state(&self, address: &str, query: &Value) -> CollectorResult<String>;

    async fn query_contract_metadata(&self, address: &str) -> CollectorResult<ContractMetadata>;
}

/// Transport backed by the Cosmos LCD (smart queries) and the Injective explorer
/// API (contract metadata).
pub struct LcdTransport {
    client: reqwest::Client,
    lcd_url: Url,
    explorer_url: Url,
}

#[derive(Debug, Deserialize)]
struct SmartQueryResponse {
    data: Value,
}

impl LcdTransport {
    pub fn new(settings: &ChainSettings) -> CollectorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            lcd_url: parse_base_url(&settings.lcd_url)?,
            explorer_url: parse_base_url(&settings.explorer_url)?,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> CollectorResult<T> {
        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::transport(format!(
                "{} returned {}: {}",
                url,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CollectorError::decode(format!("unexpected response from {}: {}", url, e)))
    }
}

fn parse_base_url(raw: &str) -> CollectorResult<Url> {
    // A trailing slash makes Url::join append instead of replacing the last segment
    let normalized = if raw.ends_with('/') { raw.to_string() } else { format!("{}/", raw) };
    Url::parse(&normalized).map_err(|e| CollectorError::transport(format!("invalid URL {}: {}", raw, e)))
}

fn join(base: &Url, path: &str) -> CollectorResult<Url> {
    base.join(path)
        .map_err(|e| CollectorError::transport(format!("invalid path {}: {}", path, e)))
}

#[async_trait]
impl ChainTransport for LcdTransport {
    async fn query_contract_state(&self, address: &str, query: &Value) -> CollectorResult<String> {
        let query_data = URL_SAFE.encode(serde_json::to_vec(query)?);
        let url = join(
            &self.lcd_url,
            &format!("cosmwasm/wasm/v1/contract/{}/smart/{}", address, query_data),
        )?;

        let response: SmartQueryResponse = self.get_json(url).await?;

        // The LCD inlines the result as JSON; gRPC-style gateways return the raw bytes
        // base64-encoded. Hand back the base64 envelope in both cases.
        match response.data {
            Value::String(encoded) => Ok(encoded),
            inline => Ok(STANDARD.encode(serde_json::to_vec(&inline)?)),
        }
    }

    async fn query_contract_metadata(&self, address: &str) -> CollectorResult<ContractMetadata> {
        let url = join(&self.explorer_url, &format!("api/explorer/v1/wasm/contracts/{}", address))?;
        let mut metadata: ContractMetadata = self.get_json(url).await?;
        if metadata.address.is_empty() {
            metadata.address = address.to_string();
        }
        Ok(metadata)
    }
}
