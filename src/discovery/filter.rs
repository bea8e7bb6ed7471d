//! Inclusion and exclusion rules applied to every validated window

use crate::discovery::options::DiscoveryOptions;
use crate::discovery::snapshot::has_real_desktop;
use crate::discovery::validator::CheckedWindow;
use crate::macos::accessibility::AccessibilityWindowInfo;
use crate::macos::process::AppInfo;
use regex::Regex;
use std::fmt;
use tracing::warn;

/// Bundle identities that never own a user-facing window
pub const SYSTEM_BUNDLES: &[&str] = &[
    "com.apple.dock",
    "com.apple.systemuiserver",
    "com.apple.controlcenter",
    "com.apple.notificationcenterui",
    "com.apple.WindowManager",
    "com.apple.Spotlight",
    "com.apple.loginwindow",
    "com.apple.screencaptureui",
    "com.apple.TextInputMenuAgent",
    "com.apple.TextInputSwitcher",
    "com.apple.wallpaper.agent",
    "com.apple.universalcontrol",
];

/// Prefixes covering menu-bar extras and system agents
pub const SYSTEM_BUNDLE_PREFIXES: &[&str] = &[
    "com.apple.dock.",
    "com.apple.controlcenter.",
    "com.apple.menuextra.",
    "com.apple.systemuiserver.",
    "com.apple.WindowManager.",
];

pub fn is_system_bundle(bundle_id: &str) -> bool {
    SYSTEM_BUNDLES.contains(&bundle_id)
        || SYSTEM_BUNDLE_PREFIXES
            .iter()
            .any(|prefix| bundle_id.starts_with(prefix))
}

/// Why a window was filtered out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    TooSmall,
    TooTransparent,
    NotLayerZero,
    Hidden,
    Minimized,
    NotWhitelisted,
    Blacklisted,
    SystemProcess,
    ExcludedAppName,
    InactiveDesktop,
    MissingTitle,
    NonStandardSubrole,
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FilterReason::TooSmall => "below minimum size",
            FilterReason::TooTransparent => "below minimum alpha",
            FilterReason::NotLayerZero => "not on layer 0",
            FilterReason::Hidden => "hidden",
            FilterReason::Minimized => "minimized",
            FilterReason::NotWhitelisted => "bundle not whitelisted",
            FilterReason::Blacklisted => "bundle blacklisted",
            FilterReason::SystemProcess => "system process",
            FilterReason::ExcludedAppName => "excluded application name",
            FilterReason::InactiveDesktop => "not on an active desktop",
            FilterReason::MissingTitle => "missing accessibility title",
            FilterReason::NonStandardSubrole => "non-standard subrole",
        };
        f.write_str(text)
    }
}

/// Everything known about one window when it is filtered
#[derive(Debug, Clone, Copy)]
pub struct FilterInput<'a> {
    pub window: &'a CheckedWindow,
    pub accessibility: Option<&'a AccessibilityWindowInfo>,
    pub app: Option<&'a AppInfo>,
    pub space_ids: &'a [u64],
}

impl FilterInput<'_> {
    fn app_name(&self) -> Option<&str> {
        self.app
            .map(|app| app.name.as_str())
            .or(self.window.owner_name.as_deref())
    }

    fn bundle_id(&self) -> Option<&str> {
        self.app.and_then(|app| app.bundle_id.as_deref())
    }
}

/// Bundle identity matcher; `*` matches any run of characters
#[derive(Debug, Clone)]
enum BundlePattern {
    Exact(String),
    Glob(Regex),
}

impl BundlePattern {
    fn parse(pattern: &str) -> Self {
        if !pattern.contains('*') {
            return BundlePattern::Exact(pattern.to_string());
        }

        let escaped: Vec<String> = pattern.split('*').map(regex::escape).collect();
        match Regex::new(&format!("^{}$", escaped.join(".*"))) {
            Ok(regex) => BundlePattern::Glob(regex),
            Err(err) => {
                warn!(pattern, error = %err, "Invalid bundle pattern, matching literally");
                BundlePattern::Exact(pattern.to_string())
            }
        }
    }

    fn matches(&self, bundle_id: &str) -> bool {
        match self {
            BundlePattern::Exact(exact) => exact == bundle_id,
            BundlePattern::Glob(regex) => regex.is_match(bundle_id),
        }
    }
}

/// Filter rules compiled once per discovery pass
#[derive(Debug, Clone)]
pub struct FilterPolicy<'o> {
    options: &'o DiscoveryOptions,
    whitelist: Vec<BundlePattern>,
    blacklist: Vec<BundlePattern>,
    excluded_names: Vec<String>,
    excluded_substrings: Vec<String>,
    active_spaces: Vec<u64>,
}

impl<'o> FilterPolicy<'o> {
    pub fn new(options: &'o DiscoveryOptions, active_spaces: Vec<u64>) -> Self {
        let lowercase = |values: &std::collections::BTreeSet<String>| {
            values.iter().map(|value| value.to_lowercase()).collect()
        };

        Self {
            options,
            whitelist: options
                .bundle_whitelist
                .iter()
                .map(|p| BundlePattern::parse(p))
                .collect(),
            blacklist: options
                .bundle_blacklist
                .iter()
                .map(|p| BundlePattern::parse(p))
                .collect(),
            excluded_names: lowercase(&options.excluded_app_names),
            excluded_substrings: lowercase(&options.excluded_app_name_substrings),
            active_spaces,
        }
    }

    pub fn accepts(&self, input: &FilterInput<'_>) -> bool {
        self.evaluate(input).is_ok()
    }

    /// Run every rule in order, reporting the first that rejects
    pub fn evaluate(&self, input: &FilterInput<'_>) -> Result<(), FilterReason> {
        let options = self.options;
        let window = input.window;
        let bounds = &window.bounds;

        if bounds.width < f64::from(options.min_width)
            || bounds.height < f64::from(options.min_height)
        {
            return Err(FilterReason::TooSmall);
        }

        if window.alpha < options.min_alpha {
            return Err(FilterReason::TooTransparent);
        }

        if options.layer_zero_only && window.layer != 0 {
            return Err(FilterReason::NotLayerZero);
        }

        if let Some(info) = input.accessibility {
            if !options.include_hidden && info.is_hidden {
                return Err(FilterReason::Hidden);
            }
            if !options.include_minimized && info.is_minimized {
                return Err(FilterReason::Minimized);
            }
        }

        self.check_identity(input)?;

        if !options.include_inactive_desktops && !self.on_active_desktop(input.space_ids) {
            return Err(FilterReason::InactiveDesktop);
        }

        if options.require_title
            && input
                .accessibility
                .and_then(|info| info.readable_title())
                .is_none()
        {
            return Err(FilterReason::MissingTitle);
        }

        if options.require_standard_subrole && !self.standard_or_large(input) {
            return Err(FilterReason::NonStandardSubrole);
        }

        Ok(())
    }

    fn check_identity(&self, input: &FilterInput<'_>) -> Result<(), FilterReason> {
        let bundle_id = input.bundle_id();

        if !self.whitelist.is_empty() {
            let listed = bundle_id
                .map(|bundle| self.whitelist.iter().any(|p| p.matches(bundle)))
                .unwrap_or(false);
            if !listed {
                return Err(FilterReason::NotWhitelisted);
            }
        }

        if let Some(bundle) = bundle_id {
            if self.blacklist.iter().any(|p| p.matches(bundle)) {
                return Err(FilterReason::Blacklisted);
            }
            if self.options.exclude_system_processes && is_system_bundle(bundle) {
                return Err(FilterReason::SystemProcess);
            }
        }

        if let Some(name) = input.app_name() {
            let name = name.to_lowercase();
            if self.excluded_names.iter().any(|excluded| *excluded == name)
                || self
                    .excluded_substrings
                    .iter()
                    .any(|fragment| name.contains(fragment.as_str()))
            {
                return Err(FilterReason::ExcludedAppName);
            }
        }

        Ok(())
    }

    /// Passes through only when neither side has desktop data
    fn on_active_desktop(&self, space_ids: &[u64]) -> bool {
        if self.active_spaces.is_empty() && space_ids.is_empty() {
            return true;
        }
        space_ids
            .iter()
            .any(|space| self.active_spaces.contains(space))
    }

    /// Standard subrole, or large enough while sitting on a real desktop
    fn standard_or_large(&self, input: &FilterInput<'_>) -> bool {
        if input
            .accessibility
            .map(|info| info.has_standard_subrole())
            .unwrap_or(false)
        {
            return true;
        }

        if has_real_desktop(input.space_ids) {
            let bounds = &input.window.bounds;
            return bounds.width >= f64::from(self.options.auxiliary_min_width)
                && bounds.height >= f64::from(self.options.auxiliary_min_height);
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macos::accessibility::STANDARD_WINDOW_SUBROLE;
    use crate::macos::core_graphics::Bounds;

    fn window(width: f64, height: f64) -> CheckedWindow {
        CheckedWindow {
            window_id: 1,
            owner_pid: 100,
            owner_name: Some("Editor".into()),
            title: None,
            bounds: Bounds {
                x: 0.0,
                y: 0.0,
                width,
                height,
            },
            alpha: 1.0,
            layer: 0,
            is_on_screen: true,
        }
    }

    fn input<'a>(
        window: &'a CheckedWindow,
        accessibility: Option<&'a AccessibilityWindowInfo>,
        app: Option<&'a AppInfo>,
        space_ids: &'a [u64],
    ) -> FilterInput<'a> {
        FilterInput {
            window,
            accessibility,
            app,
            space_ids,
        }
    }

    #[test]
    fn subrole_heuristic_uses_size_for_windows_on_a_desktop() {
        let options = DiscoveryOptions::default();
        let policy = FilterPolicy::new(&options, vec![]);

        let large = window(900.0, 600.0);
        assert!(policy.accepts(&input(&large, None, None, &[3])));

        let small = window(400.0, 300.0);
        assert_eq!(
            policy.evaluate(&input(&small, None, None, &[3])),
            Err(FilterReason::NonStandardSubrole)
        );

        // No subrole and no desktop: phantom overlay
        assert!(!policy.accepts(&input(&large, None, None, &[])));
        assert!(!policy.accepts(&input(&large, None, None, &[0])));

        let mut info = AccessibilityWindowInfo::new(1);
        info.subrole = Some(STANDARD_WINDOW_SUBROLE.into());
        assert!(policy.accepts(&input(&small, Some(&info), None, &[])));
    }

    #[test]
    fn hidden_and_minimized_only_apply_with_accessibility_info() {
        let options = DiscoveryOptions {
            require_standard_subrole: false,
            ..DiscoveryOptions::default()
        };
        let policy = FilterPolicy::new(&options, vec![]);
        let target = window(500.0, 500.0);

        let mut info = AccessibilityWindowInfo::new(1);
        info.is_minimized = true;
        assert_eq!(
            policy.evaluate(&input(&target, Some(&info), None, &[])),
            Err(FilterReason::Minimized)
        );
        assert!(policy.accepts(&input(&target, None, None, &[])));
    }

    #[test]
    fn bundle_lists_and_system_processes() {
        let mut options = DiscoveryOptions {
            require_standard_subrole: false,
            ..DiscoveryOptions::default()
        };
        options.bundle_blacklist.insert("com.example.*".into());
        let policy = FilterPolicy::new(&options, vec![]);
        let target = window(500.0, 500.0);

        let blocked = AppInfo::new(100, "Thing", Some("com.example.thing"));
        assert_eq!(
            policy.evaluate(&input(&target, None, Some(&blocked), &[])),
            Err(FilterReason::Blacklisted)
        );

        let dock = AppInfo::new(100, "Dock", Some("com.apple.dock"));
        assert_eq!(
            policy.evaluate(&input(&target, None, Some(&dock), &[])),
            Err(FilterReason::SystemProcess)
        );

        options.bundle_blacklist.clear();
        options.bundle_whitelist.insert("com.apple.Safari".into());
        let policy = FilterPolicy::new(&options, vec![]);
        assert_eq!(
            policy.evaluate(&input(&target, None, None, &[])),
            Err(FilterReason::NotWhitelisted)
        );
        let safari = AppInfo::new(100, "Safari", Some("com.apple.Safari"));
        assert!(policy.accepts(&input(&target, None, Some(&safari), &[])));
    }

    #[test]
    fn inactive_desktop_rule_passes_through_only_without_any_data() {
        let options = DiscoveryOptions {
            require_standard_subrole: false,
            include_inactive_desktops: false,
            ..DiscoveryOptions::default()
        };
        let target = window(500.0, 500.0);

        let policy = FilterPolicy::new(&options, vec![1, 7]);
        assert!(policy.accepts(&input(&target, None, None, &[7])));
        assert_eq!(
            policy.evaluate(&input(&target, None, None, &[4])),
            Err(FilterReason::InactiveDesktop)
        );
        assert_eq!(
            policy.evaluate(&input(&target, None, None, &[])),
            Err(FilterReason::InactiveDesktop)
        );

        let blind = FilterPolicy::new(&options, vec![]);
        assert!(blind.accepts(&input(&target, None, None, &[])));
        assert_eq!(
            blind.evaluate(&input(&target, None, None, &[4])),
            Err(FilterReason::InactiveDesktop)
        );
    }

    #[test]
    fn require_title_ignores_fallback_titles() {
        let options = DiscoveryOptions {
            require_standard_subrole: false,
            require_title: true,
            ..DiscoveryOptions::default()
        };
        let policy = FilterPolicy::new(&options, vec![]);
        let mut target = window(500.0, 500.0);
        target.title = Some("From window server".into());

        assert_eq!(
            policy.evaluate(&input(&target, None, None, &[])),
            Err(FilterReason::MissingTitle)
        );

        let mut info = AccessibilityWindowInfo::new(1);
        info.title = Some("Real".into());
        assert!(policy.accepts(&input(&target, Some(&info), None, &[])));
    }

    #[test]
    fn app_name_exclusions_are_case_insensitive() {
        let mut options = DiscoveryOptions {
            require_standard_subrole: false,
            ..DiscoveryOptions::default()
        };
        options.excluded_app_name_substrings.insert("helper".into());
        let policy = FilterPolicy::new(&options, vec![]);
        let mut target = window(500.0, 500.0);
        target.owner_name = Some("Chrome Helper (GPU)".into());

        assert_eq!(
            policy.evaluate(&input(&target, None, None, &[])),
            Err(FilterReason::ExcludedAppName)
        );
    }

    #[test]
    fn size_alpha_and_layer_rules() {
        let options = DiscoveryOptions::default();
        let policy = FilterPolicy::new(&options, vec![]);

        let tiny = window(50.0, 50.0);
        assert_eq!(
            policy.evaluate(&input(&tiny, None, None, &[1])),
            Err(FilterReason::TooSmall)
        );

        let mut faded = window(900.0, 600.0);
        faded.alpha = 0.0;
        assert_eq!(
            policy.evaluate(&input(&faded, None, None, &[1])),
            Err(FilterReason::TooTransparent)
        );

        let mut floating = window(900.0, 600.0);
        floating.layer = 3;
        assert_eq!(
            policy.evaluate(&input(&floating, None, None, &[1])),
            Err(FilterReason::NotLayerZero)
        );
    }
}
