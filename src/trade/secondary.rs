//! PancakeSwap V2 (secondary market)
//!
//! Quotes and swap encoding for graduated tokens, plus pair lookups used
//! by liquidity-add triggers.

use crate::chain::{CallRequest, ChainGateway};
use crate::contracts::{IPancakeFactory, IPancakePair, IPancakeRouter02};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;

/// Router swaps are cheaper than curve trades
pub const SWAP_GAS_LIMIT: u64 = 300_000;
/// Swap deadline from submission
pub const DEADLINE_SECS: i64 = 20 * 60;

pub struct SecondaryMarket {
    gateway: Arc<dyn ChainGateway>,
    router: Address,
    factory: Address,
    wbnb: Address,
}

impl SecondaryMarket {
    pub fn new(gateway: Arc<dyn ChainGateway>, router: Address, factory: Address, wbnb: Address) -> Self {
        Self {
            gateway,
            router,
            factory,
            wbnb,
        }
    }

    pub fn router(&self) -> Address {
        self.router
    }

    async fn amounts_out(&self, amount_in: U256, path: Vec<Address>) -> Result<U256> {
        let data = IPancakeRouter02::getAmountsOutCall {
            amountIn: amount_in,
            path,
        }
        .abi_encode();
        let raw = self
            .gateway
            .call(self.router, Bytes::from(data))
            .await
            .context("getAmountsOut failed")?;
        let amounts = IPancakeRouter02::getAmountsOutCall::abi_decode_returns(&raw)
            .context("Failed to decode getAmountsOut")?;
        amounts
            .last()
            .copied()
            .ok_or_else(|| anyhow!("getAmountsOut returned no amounts"))
    }

    /// BNB received for selling `amount` of `token`
    pub async fn quote_sell(&self, token: Address, amount: U256) -> Result<U256> {
        self.amounts_out(amount, vec![token, self.wbnb]).await
    }

    /// Tokens received for `funds` BNB
    pub async fn quote_buy(&self, token: Address, funds: U256) -> Result<U256> {
        self.amounts_out(funds, vec![self.wbnb, token]).await
    }

    /// Pair address, `None` when the pair does not exist
    pub async fn pair_for(&self, token: Address) -> Result<Option<Address>> {
        let data = IPancakeFactory::getPairCall {
            tokenA: token,
            tokenB: self.wbnb,
        }
        .abi_encode();
        let raw = self
            .gateway
            .call(self.factory, Bytes::from(data))
            .await
            .context("getPair failed")?;
        let pair = IPancakeFactory::getPairCall::abi_decode_returns(&raw).context("Failed to decode getPair")?;
        Ok((pair != Address::ZERO).then_some(pair))
    }

    /// Non-WBNB side of a pair
    pub async fn pair_token(&self, pair: Address) -> Result<Address> {
        let token0 = self.pair_member(pair, IPancakePair::token0Call {}.abi_encode()).await?;
        if token0 != self.wbnb {
            return Ok(token0);
        }
        self.pair_member(pair, IPancakePair::token1Call {}.abi_encode()).await
    }

    async fn pair_member(&self, pair: Address, data: Vec<u8>) -> Result<Address> {
        let raw = self
            .gateway
            .call(pair, Bytes::from(data))
            .await
            .with_context(|| format!("pair {:#x} token lookup failed", pair))?;
        // token0() and token1() share the return layout
        IPancakePair::token0Call::abi_decode_returns(&raw).context("Failed to decode pair token")
    }

    fn deadline() -> U256 {
        U256::from((chrono::Utc::now().timestamp() + DEADLINE_SECS).max(0) as u64)
    }

    pub fn build_buy(&self, token: Address, funds: U256, min_out: U256, wallet: Address) -> CallRequest {
        let data = IPancakeRouter02::swapExactETHForTokensCall {
            amountOutMin: min_out,
            path: vec![self.wbnb, token],
            to: wallet,
            deadline: Self::deadline(),
        }
        .abi_encode();
        CallRequest {
            to: self.router,
            data: Bytes::from(data),
            value: funds,
            gas_limit: SWAP_GAS_LIMIT,
        }
    }

    pub fn build_sell(&self, token: Address, amount: U256, min_out: U256, wallet: Address) -> CallRequest {
        let data = IPancakeRouter02::swapExactTokensForETHCall {
            amountIn: amount,
            amountOutMin: min_out,
            path: vec![token, self.wbnb],
            to: wallet,
            deadline: Self::deadline(),
        }
        .abi_encode();
        CallRequest {
            to: self.router,
            data: Bytes::from(data),
            value: U256::ZERO,
            gas_limit: SWAP_GAS_LIMIT,
        }
    }
}
