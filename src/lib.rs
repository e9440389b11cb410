//! four.meme launchpad trading agent
//!
//! Watches BSC for launchpad token creations, bonding-curve trades and
//! liquidity migrations, decides per monitor target whether to buy, and
//! exits positions on take-profit / stop-loss or creator rugs.

pub mod chain;
pub mod config;
pub mod context;
pub mod contracts;
pub mod error;
pub mod events;
pub mod filters;
pub mod ingest;
pub mod notify;
pub mod oracle;
pub mod positions;
pub mod store;
pub mod trade;
pub mod types;

// Re-export commonly used types
pub use config::{load_config, AppConfig, DriveMode, PolicyConfig};
pub use context::AppContext;
pub use error::TradeError;
pub use store::{RecordStore, TradeAction};
pub use types::{ClassifiedEvent, EventKind, MonitorTarget, Position, ProtocolVersion};
