//! Position book and exit rules

pub mod exit;
pub mod ledger;
pub mod risk;

pub use exit::ExitQueue;
pub use ledger::PositionLedger;
pub use risk::{ExitReason, MarketPricer, MarkPriceSource, RiskEvaluator};
