//! Core services for WinScout

pub mod window_service;

pub use window_service::*;
