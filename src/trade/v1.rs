//! Legacy TokenManager adapter
//!
//! Tokens launched on the first manager are still recognised and priced,
//! but the manager's trade entry points are not bound, so execution stops
//! at `build_call`.

use super::market::TokenMarketState;
use super::strategy::{local_bound, ProtocolAdapter};
use crate::chain::CallRequest;
use crate::error::TradeError;
use crate::types::{ProtocolVersion, TradeSide};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;

pub struct V1Adapter {
    manager: Address,
}

impl V1Adapter {
    pub fn new(manager: Address) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl ProtocolAdapter for V1Adapter {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V1
    }

    fn spender(&self) -> Address {
        self.manager
    }

    async fn compute_min_output(
        &self,
        side: TradeSide,
        _token: Address,
        amount_in: U256,
        slippage: f64,
        state: &TokenMarketState,
    ) -> U256 {
        local_bound(side, amount_in, slippage, state)
    }

    fn build_call(
        &self,
        _side: TradeSide,
        _token: Address,
        _amount_in: U256,
        _min_out: U256,
        _wallet: Address,
    ) -> Result<CallRequest, TradeError> {
        Err(TradeError::Unsupported {
            version: ProtocolVersion::V1,
            reason: "legacy manager call encoding is not bound",
        })
    }
}
