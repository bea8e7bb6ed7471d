//! Permission checks for window discovery and activation

use crate::macos::permissions::{self as system, PrivacyPane};
use crate::Result;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Permissions the tool can make use of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PermissionType {
    /// Accessibility API access for window state, titles and raising
    Accessibility,
    /// Screen recording, needed for window titles on recent macOS releases
    ScreenRecording,
}

impl PermissionType {
    fn pane(self) -> PrivacyPane {
        match self {
            PermissionType::Accessibility => PrivacyPane::Accessibility,
            PermissionType::ScreenRecording => PrivacyPane::ScreenRecording,
        }
    }
}

impl std::fmt::Display for PermissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionType::Accessibility => write!(f, "Accessibility"),
            PermissionType::ScreenRecording => write!(f, "Screen Recording"),
        }
    }
}

/// Permission status for a specific permission type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// The system call itself failed
    Unknown,
}

/// Configuration for permission checking behavior
#[derive(Debug, Clone)]
pub struct PermissionConfig {
    /// How long a checked status stays cached
    pub check_interval: Duration,
    /// Required permissions (discovery is degraded without these)
    pub required_permissions: Vec<PermissionType>,
    /// Optional permissions
    pub optional_permissions: Vec<PermissionType>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            required_permissions: vec![PermissionType::Accessibility],
            optional_permissions: vec![PermissionType::ScreenRecording],
        }
    }
}

/// Permission checker with a short-lived status cache
pub struct PermissionChecker {
    config: PermissionConfig,
    status_cache: HashMap<PermissionType, (PermissionStatus, Instant)>,
}

impl Default for PermissionChecker {
    fn default() -> Self {
        Self::new(PermissionConfig::default())
    }
}

impl PermissionChecker {
    pub fn new(config: PermissionConfig) -> Self {
        Self {
            config,
            status_cache: HashMap::new(),
        }
    }

    pub fn has_accessibility_permission(&mut self) -> bool {
        self.check_permission(PermissionType::Accessibility) == PermissionStatus::Granted
    }

    pub fn has_screen_recording_permission(&mut self) -> bool {
        self.check_permission(PermissionType::ScreenRecording) == PermissionStatus::Granted
    }

    /// Check every configured permission
    pub fn check_all_permissions(&mut self) -> HashMap<PermissionType, PermissionStatus> {
        let permissions: Vec<PermissionType> = self
            .config
            .required_permissions
            .iter()
            .chain(self.config.optional_permissions.iter())
            .copied()
            .collect();

        let results: HashMap<_, _> = permissions
            .into_iter()
            .map(|permission| (permission, self.check_permission(permission)))
            .collect();

        info!(?results, "Permission check completed");
        results
    }

    /// Check one permission, using the cache while it is fresh
    pub fn check_permission(&mut self, permission: PermissionType) -> PermissionStatus {
        if let Some((status, timestamp)) = self.status_cache.get(&permission) {
            if timestamp.elapsed() < self.config.check_interval {
                debug!(%permission, ?status, "Using cached permission status");
                return *status;
            }
        }

        let granted = match permission {
            PermissionType::Accessibility => system::is_accessibility_permission_granted(),
            PermissionType::ScreenRecording => system::is_screen_recording_permission_granted(),
        };
        let status = match granted {
            Ok(true) => PermissionStatus::Granted,
            Ok(false) => PermissionStatus::Denied,
            Err(err) => {
                warn!(%permission, error = %err, "Permission check failed");
                PermissionStatus::Unknown
            }
        };

        self.status_cache
            .insert(permission, (status, Instant::now()));
        debug!(%permission, ?status, "Permission checked");
        status
    }

    /// Trigger the system prompt, opening the privacy pane if still denied.
    ///
    /// Returns whether the permission is granted afterwards.
    pub fn request_permission(&mut self, permission: PermissionType) -> Result<bool> {
        info!(%permission, "Requesting permission");
        let granted = match permission {
            PermissionType::Accessibility => system::prompt_accessibility_permission()?,
            PermissionType::ScreenRecording => system::prompt_screen_recording_permission()?,
        };

        if !granted {
            warn!(%permission, "Permission not yet granted after prompt");
            if let Err(err) = system::open_privacy_pane(permission.pane()) {
                error!(%permission, "Failed to open privacy pane: {err}");
            }
        }

        self.status_cache.remove(&permission);
        Ok(granted)
    }

    /// Request every required permission that is not granted yet
    pub fn request_missing(&mut self) -> Result<()> {
        for permission in self.config.required_permissions.clone() {
            if self.check_permission(permission) != PermissionStatus::Granted {
                self.request_permission(permission)?;
            }
        }
        Ok(())
    }

    /// User-facing steps for enabling a permission
    pub fn get_permission_instructions(&self, permission: PermissionType) -> String {
        match permission {
            PermissionType::Accessibility => "To let winscout read and raise windows:\n\
                1. Open System Settings > Privacy & Security\n\
                2. Select 'Accessibility'\n\
                3. Enable the terminal or app running winscout\n\
                4. Run winscout again"
                .to_string(),
            PermissionType::ScreenRecording => "To let winscout read window titles:\n\
                1. Open System Settings > Privacy & Security\n\
                2. Select 'Screen Recording'\n\
                3. Enable the terminal or app running winscout\n\
                4. Run winscout again"
                .to_string(),
        }
    }

    pub fn get_permission_summary(&mut self) -> PermissionSummary {
        let statuses = self.check_all_permissions();

        let count_granted = |list: &[PermissionType]| {
            list.iter()
                .filter(|permission| statuses.get(permission) == Some(&PermissionStatus::Granted))
                .count()
        };
        let required_granted = count_granted(&self.config.required_permissions);
        let optional_granted = count_granted(&self.config.optional_permissions);
        let required_total = self.config.required_permissions.len();

        PermissionSummary {
            all_required_granted: required_granted == required_total,
            required_granted,
            required_total,
            optional_granted,
            optional_total: self.config.optional_permissions.len(),
            statuses,
        }
    }
}

/// Summary of current permission status
#[derive(Debug, Clone)]
pub struct PermissionSummary {
    pub all_required_granted: bool,
    pub required_granted: usize,
    pub required_total: usize,
    pub optional_granted: usize,
    pub optional_total: usize,
    pub statuses: HashMap<PermissionType, PermissionStatus>,
}

impl PermissionSummary {
    pub fn description(&self) -> String {
        if self.all_required_granted {
            format!(
                "All permissions granted ({}/{} required, {}/{} optional)",
                self.required_granted,
                self.required_total,
                self.optional_granted,
                self.optional_total
            )
        } else {
            format!(
                "Missing permissions ({}/{} required granted)",
                self.required_granted, self.required_total
            )
        }
    }

    /// Every permission that is not granted, in stable order
    pub fn missing_permissions(&self) -> Vec<PermissionType> {
        let mut missing: Vec<PermissionType> = self
            .statuses
            .iter()
            .filter(|(_, status)| **status != PermissionStatus::Granted)
            .map(|(permission, _)| *permission)
            .collect();
        missing.sort();
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_requires_accessibility_only() {
        let config = PermissionConfig::default();
        assert_eq!(config.required_permissions, vec![PermissionType::Accessibility]);
        assert_eq!(config.optional_permissions, vec![PermissionType::ScreenRecording]);
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn permission_flags_drive_status_and_summary() {
        std::env::set_var("WINSCOUT_PERMISSION_ACCESSIBILITY", "true");
        std::env::set_var("WINSCOUT_PERMISSION_SCREEN_RECORDING", "false");

        let mut checker = PermissionChecker::default();
        assert!(checker.has_accessibility_permission());
        assert!(!checker.has_screen_recording_permission());

        let summary = checker.get_permission_summary();
        assert!(summary.all_required_granted);
        assert_eq!(summary.optional_granted, 0);
        assert_eq!(summary.missing_permissions(), vec![PermissionType::ScreenRecording]);

        std::env::remove_var("WINSCOUT_PERMISSION_ACCESSIBILITY");
        std::env::remove_var("WINSCOUT_PERMISSION_SCREEN_RECORDING");
    }

    #[test]
    fn cached_status_is_reused_within_interval() {
        let mut checker = PermissionChecker::default();
        checker.status_cache.insert(
            PermissionType::Accessibility,
            (PermissionStatus::Granted, Instant::now()),
        );
        assert_eq!(
            checker.check_permission(PermissionType::Accessibility),
            PermissionStatus::Granted
        );
    }

    #[test]
    fn instructions_name_the_privacy_pane() {
        let checker = PermissionChecker::default();
        let instructions = checker.get_permission_instructions(PermissionType::Accessibility);
        assert!(instructions.contains("Accessibility"));
        assert!(instructions.contains("System Settings"));
    }
}
