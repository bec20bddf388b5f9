//! Utility functions for the collector.
//!
//! - [`conversion`] - Decimal parsing, fixed-point scaling and rounding
//! - [`asset`] - CosmWasm asset-info helpers

mod asset;
mod conversion;

// ============================================
// Common Constants
// ============================================

/// Staking contract amounts (stakes, emission rate) are micro-denominated.
pub const STAKING_DECIMALS: u8 = 6;

// ============================================
// Re-exports
// ============================================

pub use asset::{asset_denom, asset_info_for};
pub use conversion::{
    fraction_to_percent, json_decimal, json_f64, json_to_f64_with_decimals, round_f64,
};
