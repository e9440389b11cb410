//! Event topic table
//!
//! Topic0 hashes come straight from the `sol!` declarations, so the
//! classifier and the subscription filter can never disagree on them.

use crate::contracts::{
    IOwnable, IPancakeFactory, IPancakePair, ITokenManager1, ITokenManager2, IERC20,
};
use alloy::primitives::B256;
use alloy::sol_types::SolEvent;

// ── Standard BEP20 ────────────────────────────────────────────────────

pub const TRANSFER: B256 = IERC20::Transfer::SIGNATURE_HASH;
pub const APPROVAL: B256 = IERC20::Approval::SIGNATURE_HASH;
pub const OWNERSHIP_TRANSFERRED: B256 = IOwnable::OwnershipTransferred::SIGNATURE_HASH;

// ── PancakeSwap ───────────────────────────────────────────────────────

pub const PAIR_CREATED: B256 = IPancakeFactory::PairCreated::SIGNATURE_HASH;
pub const MINT: B256 = IPancakePair::Mint::SIGNATURE_HASH;
pub const BURN: B256 = IPancakePair::Burn::SIGNATURE_HASH;
pub const SWAP: B256 = IPancakePair::Swap::SIGNATURE_HASH;

// ── Launchpad managers ────────────────────────────────────────────────

pub const V1_PURCHASE: B256 = ITokenManager1::TokenPurchase::SIGNATURE_HASH;
pub const V1_SALE: B256 = ITokenManager1::TokenSale::SIGNATURE_HASH;
pub const V2_CREATE: B256 = ITokenManager2::TokenCreate::SIGNATURE_HASH;
pub const V2_PURCHASE: B256 = ITokenManager2::TokenPurchase::SIGNATURE_HASH;
pub const V2_SALE: B256 = ITokenManager2::TokenSale::SIGNATURE_HASH;

/// Word counts of the manager trade event bodies
pub const V1_TRADE_WORDS: usize = 5;
pub const V2_TRADE_WORDS: usize = 6;

pub fn is_v1_trade(topic: &B256) -> bool {
    *topic == V1_PURCHASE || *topic == V1_SALE
}

pub fn is_v2_trade(topic: &B256) -> bool {
    *topic == V2_PURCHASE || *topic == V2_SALE
}

/// Topics whose presence means the whole transaction needs the multi-pass classifier
pub fn needs_full_receipt(topic: &B256) -> bool {
    is_v1_trade(topic) || is_v2_trade(topic) || *topic == V2_CREATE || *topic == OWNERSHIP_TRANSFERRED
}

pub fn native_topics() -> Vec<B256> {
    vec![TRANSFER, APPROVAL]
}

pub fn dex_topics() -> Vec<B256> {
    vec![PAIR_CREATED, MINT, BURN, SWAP]
}

pub fn custom_topics() -> Vec<B256> {
    vec![
        OWNERSHIP_TRANSFERRED,
        V2_CREATE,
        V1_PURCHASE,
        V1_SALE,
        V2_PURCHASE,
        V2_SALE,
    ]
}
