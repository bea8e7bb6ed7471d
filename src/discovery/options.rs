use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

/// Every knob of the discovery filter.
///
/// The whole struct is part of the cache key, so it implements `Eq` and
/// `Hash`; `min_alpha` participates through its bit pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    pub min_width: u32,
    pub min_height: u32,
    pub min_alpha: f64,
    pub layer_zero_only: bool,
    pub include_hidden: bool,
    pub include_minimized: bool,
    pub include_inactive_desktops: bool,
    pub require_title: bool,
    pub require_standard_subrole: bool,
    /// Bundle identities to keep; `*` acts as a wildcard. Empty keeps all.
    pub bundle_whitelist: BTreeSet<String>,
    /// Bundle identities to drop; `*` acts as a wildcard
    pub bundle_blacklist: BTreeSet<String>,
    pub exclude_system_processes: bool,
    /// Application names dropped on exact (case-insensitive) match
    pub excluded_app_names: BTreeSet<String>,
    /// Application names dropped when they contain any of these
    pub excluded_app_name_substrings: BTreeSet<String>,
    pub enable_accessibility: bool,
    pub enable_desktop_info: bool,
    pub enable_cross_space_caching: bool,
    /// Minimum size for subrole-less windows that still sit on a desktop
    pub auxiliary_min_width: u32,
    pub auxiliary_min_height: u32,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            min_width: 100,
            min_height: 100,
            min_alpha: 0.1,
            layer_zero_only: true,
            include_hidden: false,
            include_minimized: false,
            include_inactive_desktops: true,
            require_title: false,
            require_standard_subrole: true,
            bundle_whitelist: BTreeSet::new(),
            bundle_blacklist: BTreeSet::new(),
            exclude_system_processes: true,
            excluded_app_names: BTreeSet::new(),
            excluded_app_name_substrings: BTreeSet::new(),
            enable_accessibility: true,
            enable_desktop_info: true,
            enable_cross_space_caching: true,
            auxiliary_min_width: 800,
            auxiliary_min_height: 500,
        }
    }
}

impl DiscoveryOptions {
    /// Window-server data only: no accessibility or desktop lookups
    pub fn fast() -> Self {
        Self {
            enable_accessibility: false,
            enable_desktop_info: false,
            enable_cross_space_caching: false,
            require_standard_subrole: false,
            ..Self::default()
        }
    }

    /// Only windows on a currently visible desktop
    pub fn active_desktop_only() -> Self {
        Self {
            include_inactive_desktops: false,
            ..Self::default()
        }
    }

    /// Whether the pipeline needs per-window desktop membership
    pub fn needs_desktop_membership(&self) -> bool {
        self.enable_desktop_info || !self.include_inactive_desktops
    }
}

impl PartialEq for DiscoveryOptions {
    fn eq(&self, other: &Self) -> bool {
        self.min_width == other.min_width
            && self.min_height == other.min_height
            && self.min_alpha.to_bits() == other.min_alpha.to_bits()
            && self.layer_zero_only == other.layer_zero_only
            && self.include_hidden == other.include_hidden
            && self.include_minimized == other.include_minimized
            && self.include_inactive_desktops == other.include_inactive_desktops
            && self.require_title == other.require_title
            && self.require_standard_subrole == other.require_standard_subrole
            && self.bundle_whitelist == other.bundle_whitelist
            && self.bundle_blacklist == other.bundle_blacklist
            && self.exclude_system_processes == other.exclude_system_processes
            && self.excluded_app_names == other.excluded_app_names
            && self.excluded_app_name_substrings == other.excluded_app_name_substrings
            && self.enable_accessibility == other.enable_accessibility
            && self.enable_desktop_info == other.enable_desktop_info
            && self.enable_cross_space_caching == other.enable_cross_space_caching
            && self.auxiliary_min_width == other.auxiliary_min_width
            && self.auxiliary_min_height == other.auxiliary_min_height
    }
}

impl Eq for DiscoveryOptions {}

impl Hash for DiscoveryOptions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.min_width.hash(state);
        self.min_height.hash(state);
        self.min_alpha.to_bits().hash(state);
        self.layer_zero_only.hash(state);
        self.include_hidden.hash(state);
        self.include_minimized.hash(state);
        self.include_inactive_desktops.hash(state);
        self.require_title.hash(state);
        self.require_standard_subrole.hash(state);
        self.bundle_whitelist.hash(state);
        self.bundle_blacklist.hash(state);
        self.exclude_system_processes.hash(state);
        self.excluded_app_names.hash(state);
        self.excluded_app_name_substrings.hash(state);
        self.enable_accessibility.hash(state);
        self.enable_desktop_info.hash(state);
        self.enable_cross_space_caching.hash(state);
        self.auxiliary_min_width.hash(state);
        self.auxiliary_min_height.hash(state);
    }
}
