//! Window discovery: validation, filtering, snapshot building and the
//! pipeline that ties them to the platform providers.

pub mod builder;
pub mod engine;
pub mod filter;
pub mod options;
pub mod snapshot;
pub mod title_cache;
pub mod validator;

pub use builder::InfoBuilder;
pub use engine::{
    assemble, drop_auxiliary_windows, sort_snapshots, DiscoveryEngine, DiscoverySources,
    EngineSettings, PassInputs,
};
pub use filter::{is_system_bundle, FilterInput, FilterPolicy, FilterReason};
pub use options::DiscoveryOptions;
pub use snapshot::WindowSnapshot;
pub use title_cache::TitleCache;
pub use validator::{validate, CheckedWindow, Rejection};
