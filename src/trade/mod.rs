//! Trade execution: market reads, protocol adapters, routing and dispatch

pub mod dispatch;
pub mod market;
pub mod min_output;
pub mod router;
pub mod secondary;
pub mod strategy;
pub mod v1;
pub mod v2;
pub mod v3;

pub use dispatch::{run_worker, TradeDispatcher, TradeJob};
pub use market::{MarketReader, TokenMarketState, TokenStatus};
pub use router::TradeRouter;
pub use secondary::SecondaryMarket;
pub use strategy::{ProtocolAdapter, StrategyTable};
