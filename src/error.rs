//! Typed trade outcomes
//!
//! Policy variants are expected no-ops: the router logs them and returns
//! `Ok(None)`. Everything else is a real failure.

use crate::trade::market::TokenStatus;
use crate::types::ProtocolVersion;
use alloy::primitives::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("token {token:#x} is not trading (status: {status})")]
    NotTrading { token: Address, status: TokenStatus },

    #[error("zero trade amount for {0:#x}")]
    ZeroAmount(Address),

    #[error("creator {creator:#x} of {token:#x} is blacklisted")]
    CreatorBlacklisted { token: Address, creator: Address },

    #[error("no open position for {0:#x}")]
    NoPosition(Address),

    #[error("no quote route for {token:#x} (quote token {quote:#x})")]
    NoRoute { token: Address, quote: Address },

    #[error("{version} execution is not supported: {reason}")]
    Unsupported {
        version: ProtocolVersion,
        reason: &'static str,
    },

    #[error("approval for {token:#x} was not confirmed")]
    ApprovalUnconfirmed { token: Address },

    #[error("submission failed: {0}")]
    Submission(String),
}

impl TradeError {
    /// Policy violations are skipped rather than surfaced
    pub fn is_policy(&self) -> bool {
        matches!(
            self,
            TradeError::NotTrading { .. }
                | TradeError::ZeroAmount(_)
                | TradeError::CreatorBlacklisted { .. }
                | TradeError::NoPosition(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_classification() {
        let token = Address::repeat_byte(1);
        assert!(TradeError::ZeroAmount(token).is_policy());
        assert!(TradeError::NotTrading { token, status: TokenStatus::Completed }.is_policy());
        assert!(!TradeError::Submission("nonce too low".into()).is_policy());
        assert!(!TradeError::Unsupported {
            version: ProtocolVersion::V1,
            reason: "legacy manager"
        }
        .is_policy());
    }
}
