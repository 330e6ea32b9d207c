pub mod adapter_factory;
pub mod engine;

pub use adapter_factory::build_adapter;
pub use engine::{MonitorEngine, WebhookDispatchResult};
