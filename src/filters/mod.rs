//! Trade filters
//!
//! Creator reputation: seeded from the policy file, grown at runtime by
//! rug detection. Consulted before every buy.

pub mod creators;

pub use creators::{CreatorReputation, TokenStats};
