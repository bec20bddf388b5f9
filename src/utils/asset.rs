//! CosmWasm `AssetInfo` helpers.
//!
//! Protocol contracts identify assets either as a bank denom
//! (`{"native_token": {"denom": "..."}}`) or as a CW20 contract
//! (`{"token": {"contract_addr": "..."}}`).

use serde_json::{json, Value};

use crate::reference::{TokenDescriptor, TokenType};

/// Extract the denom (or CW20 contract address) from an asset-info object.
pub fn asset_denom(asset_info: &Value) -> Option<&str> {
    if let Some(denom) = asset_info.pointer("/native_token/denom") {
        return denom.as_str();
    }
    asset_info.pointer("/token/contract_addr")?.as_str()
}

/// Build the asset-info object a contract expects for a reference token.
pub fn asset_info_for(token: &TokenDescriptor) -> Value {
    match token.token_type {
        TokenType::Native => json!({ "native_token": { "denom": token.denom } }),
        TokenType::Contract => json!({ "token": { "contract_addr": token.denom } }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_denom_native_and_cw20() {
        let native = json!({"native_token": {"denom": "peggy0xdAC17F958D2ee523a2206206994597C13D831ec7"}});
        let cw20 = json!({"token": {"contract_addr": "inj1cy9hes20vww2yr6crvs75gxy5hpycya2hmjg9s"}});

        assert_eq!(
            asset_denom(&native),
            Some("peggy0xdAC17F958D2ee523a2206206994597C13D831ec7")
        );
        assert_eq!(asset_denom(&cw20), Some("inj1cy9hes20vww2yr6crvs75gxy5hpycya2hmjg9s"));
        assert_eq!(asset_denom(&json!({"other": {}})), None);
    }

    #[test]
    fn test_asset_info_for_token_type() {
        let native = TokenDescriptor {
            denom: "inj".to_string(),
            ticker: "INJ".to_string(),
            decimals: 18,
            token_type: TokenType::Native,
        };
        let cw20 = TokenDescriptor {
            denom: "inj1abc".to_string(),
            ticker: "nINJ".to_string(),
            decimals: 18,
            token_type: TokenType::Contract,
        };

        assert_eq!(asset_info_for(&native), json!({"native_token": {"denom": "inj"}}));
        assert_eq!(asset_info_for(&cw20), json!({"token": {"contract_addr": "inj1abc"}}));
    }
}
