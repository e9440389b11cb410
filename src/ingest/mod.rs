//! Block and log ingestion

pub mod pipeline;
pub mod poller;
pub mod registry;
pub mod subscriber;

pub use pipeline::EventPipeline;
pub use poller::{BlockPoller, PollPass};
pub use registry::MonitorRegistry;
pub use subscriber::LogSubscriber;
