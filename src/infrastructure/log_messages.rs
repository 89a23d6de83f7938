//! Log message constants for the service lifecycle and request handling
//!
//! Centralized so log lines stay greppable across modules.

/// Application startup and lifecycle messages
pub mod application {
    pub const STARTING: &str = "Starting override proxy";
    pub const LISTENING: &str = "Override proxy listening";
    pub const SHUTTING_DOWN: &str = "Shutdown signal received";
    pub const NO_BACKENDS: &str = "No backends configured; unmatched requests will fail";
}

/// Request handling messages
pub mod requests {
    pub const OVERRIDE_MATCHED: &str = "Override matched";
    pub const UNKNOWN_BACKEND: &str = "Requested backend is not configured";
    pub const NO_BACKEND: &str = "No backend available for unmatched request";
}

/// Admin API messages
pub mod admin {
    pub const OVERRIDE_CREATED: &str = "Override created";
    pub const OVERRIDE_UPDATED: &str = "Override updated";
    pub const OVERRIDE_DELETED: &str = "Override deleted";
    pub const OVERRIDES_IMPORTED: &str = "Overrides imported";
    pub const MISSING_USER_KEY: &str = "Admin request without user key";
    pub const INVALID_USER_KEY: &str = "Admin request with invalid user key";
}

/// Configuration messages
pub mod config {
    pub const MALFORMED_BASE_API: &str = "Skipping malformed BASE_APIS entry";
    pub const DUPLICATE_BASE_API: &str = "Skipping BASE_APIS entry with an already configured key";
}
