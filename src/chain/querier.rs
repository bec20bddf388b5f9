use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use serde_json::Value;

use super::transport::{ChainTransport, ContractMetadata};
use crate::error::{CollectorError, CollectorResult};

/// Decode a smart-query envelope: base64, then JSON.
pub fn decode_envelope(envelope: &str) -> CollectorResult<Value> {
    let bytes = STANDARD.decode(envelope.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Issues contract queries through a [`ChainTransport`] and decodes the results.
#[derive(Clone)]
pub struct ContractQuerier {
    transport: Arc<dyn ChainTransport>,
}

impl ContractQuerier {
    pub fn new(transport: Arc<dyn ChainTransport>) -> Self {
        Self { transport }
    }

    pub async fn query(&self, address: &str, query: &Value) -> CollectorResult<Value> {
        let envelope = self.transport.query_contract_state(address, query).await?;
        decode_envelope(&envelope)
    }

    pub async fn metadata(&self, address: &str) -> CollectorResult<ContractMetadata> {
        self.transport.query_contract_metadata(address).await
    }

    /// Fetch every item of a paginated collection.
    ///
    /// `build_query(cursor, limit)` produces the page query; the first page is
    /// requested without a cursor. `next_cursor(last_item)` derives the cursor for
    /// the following page from the last element of a full page.
    ///
    /// Enumeration ends on an empty page, or after including a page shorter than
    /// `page_size`. Pages are requested strictly one after another.
    pub async fn enumerate_all<Q, C>(
        &self,
        address: &str,
        page_size: usize,
        build_query: Q,
        next_cursor: C,
    ) -> CollectorResult<Vec<Value>>
    where
        Q: Fn(Option<&Value>, usize) -> Value,
        C: Fn(&Value) -> Option<Value>,
    {
        let page_size = page_size.max(1);
        let mut items = Vec::new();
        let mut cursor: Option<Value> = None;
        let mut pages = 0usize;

        loop {
            let query = build_query(cursor.as_ref(), page_size);
            let page = self.query(address, &query).await?;
            pages += 1;

            let page = match page {
                Value::Array(page) => page,
                other => {
                    return Err(CollectorError::decode(format!(
                        "expected a list page from {}, got {}",
                        address,
                        type_name(&other)
                    )))
                },
            };

            if page.is_empty() {
                break;
            }

            let next = match page.last() {
                Some(last) if page.len() >= page_size => Some(next_cursor(last).ok_or_else(|| {
                    CollectorError::decode(format!("cannot derive pagination cursor from {}", last))
                })?),
                _ => None,
            };

            items.extend(page);

            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!("Enumerated {} items from {} in {} pages", items.len(), address, pages);
        Ok(items)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
