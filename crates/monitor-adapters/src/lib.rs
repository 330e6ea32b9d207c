pub mod adapter;
pub mod name_cache;

pub use adapter::{is_dropped_subtype, require_connection_token, require_field, Adapter, PollWindow, DROPPED_SUBTYPES};
pub use name_cache::NameCache;
