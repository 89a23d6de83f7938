//! Infrastructure layer for the override proxy
//!
//! Storage for rules and backends, plus shared log message constants.

pub mod log_messages;
pub mod store;

pub use store::*;
