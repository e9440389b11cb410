//! TokenManager2 adapter (BNB-settled curve)

use super::market::{MarketReader, TokenMarketState};
use super::strategy::{simulated_or_local, ProtocolAdapter};
use crate::chain::{CallRequest, TRADE_GAS_LIMIT};
use crate::contracts::ITokenManager2;
use crate::error::TradeError;
use crate::types::{ProtocolVersion, TradeSide};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;

pub struct V2Adapter {
    manager: Address,
    market: Arc<MarketReader>,
}

impl V2Adapter {
    pub fn new(manager: Address, market: Arc<MarketReader>) -> Self {
        Self { manager, market }
    }
}

#[async_trait]
impl ProtocolAdapter for V2Adapter {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V2
    }

    fn spender(&self) -> Address {
        self.manager
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
                ITokenManager2::buyTokenAMAPCall {
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
                ITokenManager2::sellTokenCall {
                    origin: U256::ZERO,
                    token,
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
            to: self.manager,
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
    use crate::contracts::{TOKEN_MANAGER_HELPER3, TOKEN_MANAGER_V2};

    fn adapter() -> V2Adapter {
        let market = Arc::new(MarketReader::new(Arc::new(MockGateway::new()), TOKEN_MANAGER_HELPER3));
        V2Adapter::new(TOKEN_MANAGER_V2, market)
    }

    #[test]
    fn test_buy_call_is_payable() {
        let token = Address::repeat_byte(1);
        let wallet = Address::repeat_byte(2);
        let req = adapter()
            .build_call(TradeSide::Buy, token, U256::from(100), U256::from(7), wallet)
            .unwrap();
        assert_eq!(req.to, TOKEN_MANAGER_V2);
        assert_eq!(req.value, U256::from(100));
        assert_eq!(req.gas_limit, TRADE_GAS_LIMIT);

        let decoded = ITokenManager2::buyTokenAMAPCall::abi_decode(&req.data).unwrap();
        assert_eq!(decoded.token, token);
        assert_eq!(decoded.to, wallet);
        assert_eq!(decoded.minAmount, U256::from(7));
    }

    #[test]
    fn test_sell_call_sends_no_value() {
        let req = adapter()
            .build_call(TradeSide::Sell, Address::repeat_byte(1), U256::from(50), U256::from(3), Address::repeat_byte(2))
            .unwrap();
        assert_eq!(req.value, U256::ZERO);
        let decoded = ITokenManager2::sellTokenCall::abi_decode(&req.data).unwrap();
        assert_eq!(decoded.amount, U256::from(50));
        assert_eq!(decoded.minFunds, U256::from(3));
        assert!(adapter().requires_approval(TradeSide::Sell));
        assert!(!adapter().requires_approval(TradeSide::Buy));
    }
}
