pub mod context;
pub mod mechanical;
pub mod processor;
pub mod sender;

pub use processor::{EventProcessor, ProcessOutcome};
