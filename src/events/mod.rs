//! Event decoding: topic registry, word helpers, receipt classifier and
//! the native transfer heuristic

pub mod classifier;
pub mod native_transfer;
pub mod topics;
pub mod words;

pub use classifier::Classifier;
pub use native_transfer::{NativeTransferFinding, NativeTransferWatcher};
