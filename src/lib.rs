//! WinScout - window discovery and cross-space activation for macOS
//!
//! WinScout fuses the window server's window list, the accessibility tree,
//! the running-process registry and the private Spaces API into immutable
//! window snapshots, caches them per query shape, and brings any one window
//! to the foreground even when it lives on another desktop.

pub mod activation;
pub mod cache;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod logging;
pub mod macos;
pub mod permissions;
pub mod services;

pub use discovery::{DiscoveryOptions, WindowSnapshot};
pub use services::*;

/// Result type alias for WinScout operations
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to WinScout operations
#[derive(thiserror::Error, Debug)]
pub enum ScoutError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Window provider failure: {0}")]
    ProviderFailure(String),

    #[error("Private API unavailable: {0}")]
    PrivateApiUnavailable(String),

    #[error("Cache inconsistency: {0}")]
    CacheInconsistency(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
