//! Launchpad market queries
//!
//! Read-only calls against TokenManagerHelper3 (token state and trade
//! simulation) and the BEP20 surface (allowance / balance). All of them
//! are `eth_call`s and cost no gas.

use crate::chain::ChainGateway;
use crate::contracts::{ITokenManagerHelper3, IERC20};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;

/// Launchpad trading status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// Still on the bonding curve
    Trading,
    /// Graduated; liquidity moved to PancakeSwap
    Completed,
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TokenStatus::Trading => write!(f, "TRADING"),
            TokenStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// `getTokenInfo` result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMarketState {
    pub version: U256,
    pub manager: Address,
    /// Zero address for BNB-quoted tokens
    pub quote: Address,
    pub last_price: U256,
    pub trading_fee_rate: U256,
    pub min_trading_fee: U256,
    pub launch_time: U256,
    /// Tokens left on the curve
    pub offers: U256,
    pub max_offers: U256,
    /// Funds raised so far
    pub funds: U256,
    pub max_funds: U256,
    pub liquidity_added: bool,
}

impl TokenMarketState {
    pub fn status(&self) -> TokenStatus {
        if self.liquidity_added {
            TokenStatus::Completed
        } else {
            TokenStatus::Trading
        }
    }
}

/// `tryBuy` simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyQuote {
    pub manager: Address,
    pub quote: Address,
    pub estimated_amount: U256,
    pub estimated_cost: U256,
    pub estimated_fee: U256,
    pub amount_msg_value: U256,
}

/// `trySell` simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellQuote {
    pub manager: Address,
    pub quote: Address,
    pub funds: U256,
    pub fee: U256,
}

pub struct MarketReader {
    gateway: Arc<dyn ChainGateway>,
    helper: Address,
}

impl MarketReader {
    pub fn new(gateway: Arc<dyn ChainGateway>, helper: Address) -> Self {
        Self { gateway, helper }
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Bytes> {
        self.gateway.call(to, Bytes::from(data)).await
    }

    pub async fn token_state(&self, token: Address) -> Result<TokenMarketState> {
        let data = ITokenManagerHelper3::getTokenInfoCall { token }.abi_encode();
        let raw = self
            .call(self.helper, data)
            .await
            .with_context(|| format!("getTokenInfo({:#x}) failed", token))?;
        let info = ITokenManagerHelper3::getTokenInfoCall::abi_decode_returns(&raw)
            .context("Failed to decode getTokenInfo")?;

        Ok(TokenMarketState {
            version: info.version,
            manager: info.tokenManager,
            quote: info.quote,
            last_price: info.lastPrice,
            trading_fee_rate: info.tradingFeeRate,
            min_trading_fee: info.minTradingFee,
            launch_time: info.launchTime,
            offers: info.offers,
            max_offers: info.maxOffers,
            funds: info.funds,
            max_funds: info.maxFunds,
            liquidity_added: info.liquidityAdded,
        })
    }

    /// Simulate spending `funds` on `token`
    pub async fn try_buy(&self, token: Address, funds: U256) -> Result<BuyQuote> {
        let data = ITokenManagerHelper3::tryBuyCall {
            token,
            amount: U256::ZERO,
            funds,
        }
        .abi_encode();
        let raw = self
            .call(self.helper, data)
            .await
            .with_context(|| format!("tryBuy({:#x}) failed", token))?;
        let r = ITokenManagerHelper3::tryBuyCall::abi_decode_returns(&raw)
            .context("Failed to decode tryBuy")?;

        Ok(BuyQuote {
            manager: r.tokenManager,
            quote: r.quote,
            estimated_amount: r.estimatedAmount,
            estimated_cost: r.estimatedCost,
            estimated_fee: r.estimatedFee,
            amount_msg_value: r.amountMsgValue,
        })
    }

    /// Simulate selling `amount` of `token`
    pub async fn try_sell(&self, token: Address, amount: U256) -> Result<SellQuote> {
        let data = ITokenManagerHelper3::trySellCall { token, amount }.abi_encode();
        let raw = self
            .call(self.helper, data)
            .await
            .with_context(|| format!("trySell({:#x}) failed", token))?;
        let r = ITokenManagerHelper3::trySellCall::abi_decode_returns(&raw)
            .context("Failed to decode trySell")?;

        Ok(SellQuote {
            manager: r.tokenManager,
            quote: r.quote,
            funds: r.funds,
            fee: r.fee,
        })
    }

    pub async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let data = IERC20::allowanceCall { owner, spender }.abi_encode();
        let raw = self
            .call(token, data)
            .await
            .with_context(|| format!("allowance on {:#x} failed", token))?;
        IERC20::allowanceCall::abi_decode_returns(&raw).context("Failed to decode allowance")
    }

    pub async fn balance_of(&self, token: Address, account: Address) -> Result<U256> {
        let data = IERC20::balanceOfCall { account }.abi_encode();
        let raw = self
            .call(token, data)
            .await
            .with_context(|| format!("balanceOf on {:#x} failed", token))?;
        IERC20::balanceOfCall::abi_decode_returns(&raw).context("Failed to decode balanceOf")
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::chain::testing::MockGateway;
    use alloy::sol_types::SolValue;

    /// Program `getTokenInfo` on the mock
    pub fn respond_token_info(
        gateway: &MockGateway,
        manager: Address,
        quote: Address,
        offers: U256,
        funds: U256,
        liquidity_added: bool,
    ) {
        let encoded = (
            U256::from(2),
            manager,
            quote,
            U256::from(1),
            U256::from(100),
            U256::ZERO,
            U256::from(1_700_000_000u64),
            offers,
            U256::from(800_000_000u64) * U256::from(10).pow(U256::from(18)),
            funds,
            U256::from(24) * U256::from(10).pow(U256::from(18)),
            liquidity_added,
        )
            .abi_encode_params();
        gateway.respond(ITokenManagerHelper3::getTokenInfoCall::SELECTOR, encoded);
    }

    pub fn respond_try_buy(gateway: &MockGateway, manager: Address, estimated_amount: U256) {
        let encoded = (
            manager,
            Address::ZERO,
            estimated_amount,
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
            U256::ZERO,
        )
            .abi_encode_params();
        gateway.respond(ITokenManagerHelper3::tryBuyCall::SELECTOR, encoded);
    }

    pub fn respond_try_sell(gateway: &MockGateway, manager: Address, funds: U256) {
        let encoded = (manager, Address::ZERO, funds, U256::ZERO).abi_encode_params();
        gateway.respond(ITokenManagerHelper3::trySellCall::SELECTOR, encoded);
    }

    pub fn respond_allowance(gateway: &MockGateway, allowance: U256) {
        gateway.respond(IERC20::allowanceCall::SELECTOR, allowance.abi_encode());
    }
}
