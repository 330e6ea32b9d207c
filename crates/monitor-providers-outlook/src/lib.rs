pub mod adapter;
pub mod client;

pub use adapter::{OutlookAdapter, OutlookConfig};
pub use client::OutlookClient;
