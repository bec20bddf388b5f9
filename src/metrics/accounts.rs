use rustc_hash::FxHashSet;
use serde_json::{json, Value};

use crate::db::models::{MetricPayload, MetricValue};
use crate::error::{CollectorError, CollectorResult};

/// `get_all_accounts` page query; the cursor is the `[address, index]` of the last
/// account of the previous page.
pub fn accounts_page_query(cursor: Option<&Value>, limit: usize) -> Value {
    match cursor {
        Some(cursor) => json!({ "get_all_accounts": { "start_after": cursor, "limit": limit } }),
        None => json!({ "get_all_accounts": { "limit": limit } }),
    }
}

/// Account entries look like `[[address, index], account]`.
pub fn account_cursor(last: &Value) -> Option<Value> {
    let id = last.get(0)?;
    let address = id.get(0)?.as_str()?;
    let index = id.get(1)?;
    Some(json!([address, index]))
}

/// Borrow account totals. One address may own several indexed accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountCensus {
    pub total_accounts: u64,
    pub unique_addresses: u64,
}

impl AccountCensus {
    pub fn from_accounts(accounts: &[Value]) -> CollectorResult<Self> {
        let mut addresses = FxHashSet::default();
        for entry in accounts {
            let address = entry
                .get(0)
                .and_then(|id| id.get(0))
                .and_then(Value::as_str)
                .ok_or_else(|| CollectorError::decode(format!("malformed account entry {}", entry)))?;
            addresses.insert(address);
        }

        Ok(Self { total_accounts: accounts.len() as u64, unique_addresses: addresses.len() as u64 })
    }

    pub fn payload(&self) -> MetricPayload {
        MetricPayload::from([
            ("total_accounts".to_string(), MetricValue::count(self.total_accounts)),
            ("unique_addresses".to_string(), MetricValue::count(self.unique_addresses)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(address: &str, index: u64) -> Value {
        json!([[address, index], {"debts": [], "collaterals": []}])
    }

    #[test]
    fn test_census_counts_unique_owners() {
        let accounts = vec![account("inj1a", 0), account("inj1a", 1), account("inj1b", 0)];
        let census = AccountCensus::from_accounts(&accounts).unwrap();

        assert_eq!(census, AccountCensus { total_accounts: 3, unique_addresses: 2 });
        let payload = census.payload();
        assert_eq!(payload["total_accounts"].to_string(), "3");
        assert_eq!(payload["unique_addresses"].to_string(), "2");
    }

    #[test]
    fn test_empty_census() {
        assert_eq!(AccountCensus::from_accounts(&[]).unwrap(), AccountCensus::default());
    }

    #[test]
    fn test_malformed_account() {
        assert!(AccountCensus::from_accounts(&[json!({"owner": "inj1a"})]).is_err());
    }

    #[test]
    fn test_page_query_and_cursor() {
        assert_eq!(
            accounts_page_query(None, 100),
            json!({"get_all_accounts": {"limit": 100}})
        );

        let cursor = account_cursor(&account("inj1z", 4)).unwrap();
        assert_eq!(cursor, json!(["inj1z", 4]));
        assert_eq!(
            accounts_page_query(Some(&cursor), 50),
            json!({"get_all_accounts": {"start_after": ["inj1z", 4], "limit": 50}})
        );
        assert_eq!(account_cursor(&json!("garbage")), None);
    }
}
