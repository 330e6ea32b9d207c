pub mod adapter;
pub mod client;

pub use adapter::{GmailAdapter, GmailConfig};
pub use client::GmailClient;
