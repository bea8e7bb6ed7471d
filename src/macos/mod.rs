//! macOS integration layer for WinScout
//!
//! These modules provide safe, testable abstractions over the macOS window
//! server, Accessibility, process registry, Spaces and Objective-C runtime
//! APIs. The concrete implementations talk to the platform while tests rely
//! on the in-memory providers or mocks.

pub mod accessibility;
pub mod core_graphics;
pub mod notifications;
pub mod objc_bridge;
pub mod permissions;
pub mod process;
pub mod skylight;
pub mod spaces;
pub mod window_server;

pub use accessibility::*;
pub use core_graphics::*;
pub use notifications::WorkspaceObserver;
pub use objc_bridge::*;
pub use process::{
    ActivationPolicy, AppInfo, InMemoryProcessRegistry, ProcessRegistry, SystemProcessRegistry,
};
pub use skylight::Availability;
pub use spaces::*;
pub use window_server::*;
