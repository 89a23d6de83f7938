//! Application services and business logic orchestration
//!
//! This module contains application services that coordinate
//! domain logic and infrastructure components.

pub mod app;
pub mod overrides;

pub use app::Application;
pub use overrides::{MatchOutcome, OverrideService, ProxyOutcome, SyntheticResponse};
