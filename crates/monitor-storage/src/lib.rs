pub mod db;
pub mod ports;
pub mod sqlite;

pub use ports::{Decryptor, EncryptedConnection, MonitorUpdate, PlaintextDecryptor, Storage};
pub use sqlite::SqliteStorage;
