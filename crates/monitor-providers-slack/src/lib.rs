pub mod adapter;
pub mod client;
pub mod filters;

pub use adapter::{SlackAdapter, SlackConfig};
pub use client::SlackClient;
