//! Singleton session registry: admission, status transitions, subscriber
//! fan-out membership, and the stall-timeout watchdog.

mod manager;
mod subscriber;

pub use manager::{PipelineHandle, SessionManager};
pub use subscriber::SubscriberHandle;
