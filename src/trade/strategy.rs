//! Protocol adapters and version resolution
//!
//! Each launchpad generation gets one [`ProtocolAdapter`]. The router asks
//! the [`StrategyTable`] for the adapter matching a token's queried market
//! state, then lets the adapter bound the output and encode the call.

use super::market::{MarketReader, TokenMarketState};
use super::min_output::{apply_slippage, local_min_funds, local_min_output};
use crate::chain::CallRequest;
use crate::config::Protocols;
use crate::error::TradeError;
use crate::types::{ProtocolVersion, TradeSide};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn version(&self) -> ProtocolVersion;

    /// Contract the trade call goes to; also the approval spender
    fn spender(&self) -> Address;

    /// Sells pull tokens with `transferFrom`
    fn requires_approval(&self, side: TradeSide) -> bool {
        side == TradeSide::Sell
    }

    /// Protected minimum output for `amount_in` (BNB for buys, tokens for sells)
    async fn compute_min_output(
        &self,
        side: TradeSide,
        token: Address,
        amount_in: U256,
        slippage: f64,
        state: &TokenMarketState,
    ) -> U256;

    fn build_call(
        &self,
        side: TradeSide,
        token: Address,
        amount_in: U256,
        min_out: U256,
        wallet: Address,
    ) -> Result<CallRequest, TradeError>;
}

/// Simulation first, local curve math when the simulation errors
pub(crate) async fn simulated_or_local(
    market: &MarketReader,
    side: TradeSide,
    token: Address,
    amount_in: U256,
    slippage: f64,
    state: &TokenMarketState,
) -> U256 {
    let simulated = match side {
        TradeSide::Buy => market.try_buy(token, amount_in).await.map(|q| q.estimated_amount),
        TradeSide::Sell => market.try_sell(token, amount_in).await.map(|q| q.funds),
    };
    match simulated {
        Ok(expected) if !expected.is_zero() => {
            debug!("{} simulation for {:#x}: expected {}", side, token, expected);
            apply_slippage(expected, slippage)
        }
        Ok(_) => local_bound(side, amount_in, slippage, state),
        Err(e) => {
            warn!("{} simulation for {:#x} failed, using local estimate: {:#}", side, token, e);
            local_bound(side, amount_in, slippage, state)
        }
    }
}

pub(crate) fn local_bound(side: TradeSide, amount_in: U256, slippage: f64, state: &TokenMarketState) -> U256 {
    match side {
        TradeSide::Buy => local_min_output(amount_in, state.offers, state.funds, slippage),
        TradeSide::Sell => local_min_funds(amount_in, state.offers, state.funds, slippage),
    }
}

pub struct StrategyTable {
    protocols: Protocols,
    adapters: HashMap<ProtocolVersion, Arc<dyn ProtocolAdapter>>,
}

impl StrategyTable {
    pub fn new(protocols: Protocols) -> Self {
        Self {
            protocols,
            adapters: HashMap::new(),
        }
    }

    pub fn register(mut self, adapter: Arc<dyn ProtocolAdapter>) -> Self {
        self.adapters.insert(adapter.version(), adapter);
        self
    }

    /// Standard table: V1 (reserved), V2 and V3 adapters
    pub fn standard(protocols: Protocols, market: Arc<MarketReader>) -> Self {
        let v1 = super::v1::V1Adapter::new(protocols.manager_v1);
        let v2 = super::v2::V2Adapter::new(protocols.manager_v2, market.clone());
        let v3 = super::v3::V3Adapter::new(protocols.helper3, market);
        Self::new(protocols)
            .register(Arc::new(v1))
            .register(Arc::new(v2))
            .register(Arc::new(v3))
    }

    /// Manager first (legacy tokens), then the settlement currency
    pub fn resolve_version(&self, token: Address, state: &TokenMarketState) -> Result<ProtocolVersion, TradeError> {
        if state.manager == self.protocols.manager_v1 {
            return Ok(ProtocolVersion::V1);
        }
        if state.quote == Address::ZERO || state.quote == self.protocols.wbnb {
            return Ok(ProtocolVersion::V2);
        }
        if self.protocols.is_quote_token(state.quote) {
            return Ok(ProtocolVersion::V3);
        }
        Err(TradeError::NoRoute {
            token,
            quote: state.quote,
        })
    }

    pub fn adapter(&self, version: ProtocolVersion) -> Option<Arc<dyn ProtocolAdapter>> {
        self.adapters.get(&version).cloned()
    }

    pub fn resolve(&self, token: Address, state: &TokenMarketState) -> Result<Arc<dyn ProtocolAdapter>, TradeError> {
        let version = self.resolve_version(token, state)?;
        self.adapter(version).ok_or(TradeError::Unsupported {
            version,
            reason: "no adapter registered",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::MockGateway;
    use crate::contracts::{TOKEN_MANAGER_HELPER3, TOKEN_MANAGER_V1, TOKEN_MANAGER_V2, USD1, WBNB};

    fn state(manager: Address, quote: Address) -> TokenMarketState {
        TokenMarketState {
            version: U256::from(2),
            manager,
            quote,
            last_price: U256::ZERO,
            trading_fee_rate: U256::ZERO,
            min_trading_fee: U256::ZERO,
            launch_time: U256::ZERO,
            offers: U256::from(2000),
            max_offers: U256::ZERO,
            funds: U256::from(1000),
            max_funds: U256::ZERO,
            liquidity_added: false,
        }
    }

    fn table() -> StrategyTable {
        let market = Arc::new(MarketReader::new(Arc::new(MockGateway::new()), TOKEN_MANAGER_HELPER3));
        StrategyTable::standard(Protocols::default(), market)
    }

    #[test]
    fn test_version_resolution() {
        let t = table();
        let token = Address::repeat_byte(1);
        assert_eq!(t.resolve_version(token, &state(TOKEN_MANAGER_V2, Address::ZERO)).unwrap(), ProtocolVersion::V2);
        assert_eq!(t.resolve_version(token, &state(TOKEN_MANAGER_V2, WBNB)).unwrap(), ProtocolVersion::V2);
        assert_eq!(t.resolve_version(token, &state(TOKEN_MANAGER_V2, USD1)).unwrap(), ProtocolVersion::V3);
        assert_eq!(t.resolve_version(token, &state(TOKEN_MANAGER_V1, Address::ZERO)).unwrap(), ProtocolVersion::V1);
        assert!(matches!(
            t.resolve_version(token, &state(TOKEN_MANAGER_V2, Address::repeat_byte(9))),
            Err(TradeError::NoRoute { .. })
        ));
    }

    #[test]
    fn test_v1_is_reserved() {
        let t = table();
        let token = Address::repeat_byte(1);
        let adapter = t.resolve(token, &state(TOKEN_MANAGER_V1, Address::ZERO)).unwrap();
        let err = adapter
            .build_call(TradeSide::Buy, token, U256::from(1), U256::from(1), Address::repeat_byte(2))
            .unwrap_err();
        assert!(matches!(err, TradeError::Unsupported { version: ProtocolVersion::V1, .. }));
    }

    #[tokio::test]
    async fn test_simulation_failure_falls_back_to_local() {
        let market = MarketReader::new(Arc::new(MockGateway::new()), TOKEN_MANAGER_HELPER3);
        let st = state(TOKEN_MANAGER_V2, Address::ZERO);
        let bound = simulated_or_local(&market, TradeSide::Buy, Address::repeat_byte(1), U256::from(100), 0.0, &st).await;
        assert_eq!(bound, U256::from(200));
    }

    #[tokio::test]
    async fn test_simulation_preferred() {
        let gateway = Arc::new(MockGateway::new());
        crate::trade::market::testing::respond_try_buy(&gateway, TOKEN_MANAGER_V2, U256::from(1000));
        let market = MarketReader::new(gateway, TOKEN_MANAGER_HELPER3);
        let st = state(TOKEN_MANAGER_V2, Address::ZERO);
        let bound = simulated_or_local(&market, TradeSide::Buy, Address::repeat_byte(1), U256::from(100), 0.1, &st).await;
        assert_eq!(bound, U256::from(900));
    }
}
