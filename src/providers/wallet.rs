//! EVM wallet source: JSON-RPC for balance/nonce/code, Etherscan for the
//! transaction sample, the price source for the USD balance.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::models::errors::{AppError, AppResult};
use crate::models::types::WalletDetail;
use crate::providers::{EtherscanClient, PriceSource, RpcProvider, WalletDataSource};
use crate::utils::cache::TtlCache;
use crate::utils::constants::{
    wei_to_ether, wei_to_ether_string, COINGECKO_ETHEREUM_ID, MARKET_SNAPSHOT_TTL,
};

const PRICE_CACHE_KEY: &str = "price:ethereum";

/// EIP-1167 minimal proxy runtime prefix
const MINIMAL_PROXY_PREFIX: &str = "363d3d373d3d3d363d73";
/// ERC-721 interface id as pushed by `supportsInterface`
const ERC721_INTERFACE_ID: &str = "80ac58cd";
/// ERC-1155 interface id
const ERC1155_INTERFACE_ID: &str = "d9b67a26";
/// transfer(address,uint256) and balanceOf(address)
const ERC20_SELECTORS: [&str; 2] = ["a9059cbb", "70a08231"];

pub struct EvmWalletSource {
    rpc: RpcProvider,
    etherscan: EtherscanClient,
    prices: Arc<dyn PriceSource>,
    /// ETH/USD reused across wallets for one snapshot TTL
    price_cache: TtlCache,
}

impl EvmWalletSource {
    pub fn new(rpc: RpcProvider, etherscan: EtherscanClient, prices: Arc<dyn PriceSource>) -> Self {
        Self {
            rpc,
            etherscan,
            prices,
            price_cache: TtlCache::new(),
        }
    }

    async fn eth_usd(&self) -> AppResult<f64> {
        if let Some(price) = self.price_cache.get(PRICE_CACHE_KEY).and_then(|v| v.as_f64()) {
            return Ok(price);
        }
        let market = self.prices.fetch_market(COINGECKO_ETHEREUM_ID).await?;
        self.price_cache.set(
            PRICE_CACHE_KEY,
            serde_json::json!(market.price),
            MARKET_SNAPSHOT_TTL,
        );
        Ok(market.price)
    }
}

#[async_trait]
impl WalletDataSource for EvmWalletSource {
    async fn fetch_wallet(&self, address: &str, sample_size: usize) -> AppResult<WalletDetail> {
        let (wei, nonce, code, transactions, price) = tokio::try_join!(
            self.rpc.get_balance(address),
            self.rpc.get_transaction_count(address),
            self.rpc.get_code(address),
            self.etherscan.fetch_transactions(address, sample_size),
            self.eth_usd(),
        )?;

        let balance = wei_to_ether_string(&wei.to_string())
            .ok_or_else(|| AppError::invalid_response(format!("balance {} not decimal", wei)))?;
        let contract_type = classify_contract(&code);
        let is_contract = contract_type.is_some();

        // The nonce only counts sent transactions; receive-only wallets still
        // show activity through the sample
        let transaction_count = nonce.max(transactions.len() as u64);

        debug!(
            "🔍 {} | {} ETH | nonce {} | contract: {}",
            address, balance, nonce, is_contract
        );

        Ok(WalletDetail {
            address: address.to_string(),
            balance,
            balance_usd: wei_to_ether(wei) * price,
            transaction_count,
            is_contract,
            contract_type,
            transactions,
        })
    }
}

/// `None` for externally owned accounts, else a coarse contract kind
pub fn classify_contract(code: &str) -> Option<String> {
    let body = code.trim().trim_start_matches("0x").to_lowercase();
    if body.is_empty() {
        return None;
    }

    let kind = if body.starts_with(MINIMAL_PROXY_PREFIX) {
        "proxy"
    } else if body.contains(ERC1155_INTERFACE_ID) {
        "erc1155"
    } else if body.contains(ERC721_INTERFACE_ID) {
        "erc721"
    } else if ERC20_SELECTORS.iter().all(|sel| body.contains(sel)) {
        "erc20"
    } else {
        "unknown"
    };
    Some(kind.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eoa_has_no_contract_type() {
        assert_eq!(classify_contract("0x"), None);
        assert_eq!(classify_contract(""), None);
    }

    #[test]
    fn test_contract_kinds() {
        assert_eq!(
            classify_contract("0x363d3d373d3d3d363d73bebebebebebebebebebebebebebebebebebebebe5af4")
                .as_deref(),
            Some("proxy")
        );
        assert_eq!(
            classify_contract("0x6080604052a9059cbb0000070a08231").as_deref(),
            Some("erc20")
        );
        assert_eq!(
            classify_contract("0x608060405280AC58CD").as_deref(),
            Some("erc721")
        );
        assert_eq!(classify_contract("0x60806040").as_deref(), Some("unknown"));
    }
}
