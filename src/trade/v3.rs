//! TokenManagerHelper3 adapter (quote-settled curve)
//!
//! The helper swaps BNB into the token's quote currency on the way in and
//! back to BNB on the way out, so the agent only ever pays and receives BNB.

use super::market::{MarketReader, TokenMarketState};
use super::strategy::{simulated_or_local, ProtocolAdapter};
use crate::chain::{CallRequest, TRADE_GAS_LIMIT};
use crate::contracts::ITokenManagerHelper3;
use crate::error::TradeError;
use crate::types::{ProtocolVersion, TradeSide};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;

pub struct V3Adapter {
    helper: Address,
    market: Arc<MarketReader>,
}

impl V3Adapter {
    pub fn new(helper: Address, market: Arc<MarketReader>) -> Self {
        Self { helper, market }
    }
}

#[async_trait]
impl ProtocolAdapter for V3Adapter {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V3
    }

    fn spender(&self) -> Address {
        self.helper
    }

    async fn compute_min_output(
        &self,
        side: TradeSide,
        token: Address,
        amount_in: U256,
        slippage: f64,
        state: &TokenMarketState,
    ) -> U256 {
        simulated_or_local(&self.market, side, token, amount_in, slippage, state).await
    }

    fn build_call(
        &self,
        side: TradeSide,
        token: Address,
        amount_in: U256,
        min_out: U256,
        wallet: Address,
    ) -> Result<CallRequest, TradeError> {
        let (data, value) = match side {
            TradeSide::Buy => (
                ITokenManagerHelper3::buyWithEthCall {
                    origin: U256::ZERO,
                    token,
                    to: wallet,
                    funds: amount_in,
                    minAmount: min_out,
                }
                .abi_encode(),
                amount_in,
            ),
            TradeSide::Sell => (
                ITokenManagerHelper3::sellForEthCall {
                    origin: U256::ZERO,
                    token,
                    from: wallet,
                    amount: amount_in,
                    minFunds: min_out,
                    feeRate: U256::ZERO,
                    feeRecipient: Address::ZERO,
                }
                .abi_encode(),
                U256::ZERO,
            ),
        };
        Ok(CallRequest {
            to: self.helper,
            data: Bytes::from(data),
            value,
            gas_limit: TRADE_GAS_LIMIT,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::MockGateway;
    use crate::contracts::TOKEN_MANAGER_HELPER3;

    #[test]
    fn test_calls_target_helper() {
        let market = Arc::new(MarketReader::new(Arc::new(MockGateway::new()), TOKEN_MANAGER_HELPER3));
        let adapter = V3Adapter::new(TOKEN_MANAGER_HELPER3, market);
        let wallet = Address::repeat_byte(2);

        let buy = adapter
            .build_call(TradeSide::Buy, Address::repeat_byte(1), U256::from(10), U256::from(1), wallet)
            .unwrap();
        assert_eq!(buy.to, TOKEN_MANAGER_HELPER3);
        assert_eq!(buy.value, U256::from(10));
        assert!(ITokenManagerHelper3::buyWithEthCall::abi_decode(&buy.data).is_ok());

        let sell = adapter
            .build_call(TradeSide::Sell, Address::repeat_byte(1), U256::from(10), U256::from(1), wallet)
            .unwrap();
        let decoded = ITokenManagerHelper3::sellForEthCall::abi_decode(&sell.data).unwrap();
        assert_eq!(decoded.from, wallet);
        assert_eq!(adapter.spender(), TOKEN_MANAGER_HELPER3);
    }
}
