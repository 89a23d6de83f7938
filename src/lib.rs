//! Override Proxy - an HTTP mock/override proxy
//!
//! Requests matching a stored override get a synthetic response; everything
//! else is forwarded to a configured backend and relayed verbatim.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod proxy;

pub use application::Application;
pub use error::{Error, Result};
