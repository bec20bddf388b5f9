//! Chain-state access: the transport seam, envelope decoding and pagination.

mod querier;
mod transport;

pub use querier::{decode_envelope, ContractQuerier};
pub use transport::{ChainTransport, ContractMetadata, LcdTransport};
