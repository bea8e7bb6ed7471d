//! Bringing one specific window to the foreground, across desktops

pub mod engine;
pub mod protocol;
pub mod queue;

pub use engine::{
    ActivationDependencies, ActivationEngine, ActivationReport, ElementResolver,
    ProcessIdResolver, WindowListResolver,
};
pub use protocol::{MakeKeyCommand, Phase};
pub use queue::{ActivationQueue, DEFAULT_MAX_CONCURRENT};
