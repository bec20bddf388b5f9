use log::warn;

use crate::chain::ContractMetadata;
use crate::db::models::{MetricPayload, MetricValue};

/// Execute counts keyed by contract name. Contracts whose metadata carries no
/// count are left out.
pub fn executes_payload<'a>(
    contracts: impl IntoIterator<Item = (&'a str, &'a ContractMetadata)>,
) -> MetricPayload {
    let mut payload = MetricPayload::new();
    for (name, metadata) in contracts {
        match metadata.executes {
            Some(count) => {
                payload.insert(name.to_string(), MetricValue::count(count));
            },
            None => warn!("No execute count for {} ({})", name, metadata.address),
        }
    }
    payload
}
