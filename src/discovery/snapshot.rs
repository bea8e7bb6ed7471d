use crate::macos::accessibility::{DIALOG_SUBROLE, STANDARD_WINDOW_SUBROLE};
use crate::macos::core_graphics::Bounds;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::hash::{Hash, Hasher};

/// Immutable, point-in-time record of one window.
///
/// Two snapshots with the same `window_id` compare equal: they describe the
/// same window at different moments.
#[derive(Debug, Clone, Serialize)]
pub struct WindowSnapshot {
    pub window_id: u32,
    pub title: String,
    pub bounds: Bounds,
    pub alpha: f64,
    pub is_on_screen: bool,
    pub layer: i32,
    pub pid: i32,
    pub bundle_id: Option<String>,
    pub app_name: String,
    pub is_minimized: bool,
    pub is_hidden: bool,
    pub is_fullscreen: bool,
    pub is_focused: bool,
    pub is_main: bool,
    pub is_tabbed: bool,
    pub space_ids: Vec<u64>,
    pub is_on_all_spaces: bool,
    /// 1-indexed desktop position on its display
    pub desktop_number: Option<usize>,
    pub display_id: Option<u32>,
    pub role: Option<String>,
    pub subrole: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl WindowSnapshot {
    pub fn has_standard_subrole(&self) -> bool {
        matches!(
            self.subrole.as_deref(),
            Some(STANDARD_WINDOW_SUBROLE) | Some(DIALOG_SUBROLE)
        )
    }

    /// Whether the window occupies at least one non-zero desktop id
    pub fn has_real_desktop(&self) -> bool {
        has_real_desktop(&self.space_ids)
    }
}

pub(crate) fn has_real_desktop(space_ids: &[u64]) -> bool {
    space_ids.iter().any(|space| *space != 0)
}

impl PartialEq for WindowSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.window_id == other.window_id
    }
}

impl Eq for WindowSnapshot {}

impl Hash for WindowSnapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.window_id.hash(state);
    }
}

#[cfg(test)]
pub(crate) fn sample_snapshot(window_id: u32, pid: i32, title: &str) -> WindowSnapshot {
    WindowSnapshot {
        window_id,
        title: title.to_string(),
        bounds: Bounds::new(0.0, 0.0, 800.0, 600.0).unwrap(),
        alpha: 1.0,
        is_on_screen: true,
        layer: 0,
        pid,
        bundle_id: None,
        app_name: format!("App {pid}"),
        is_minimized: false,
        is_hidden: false,
        is_fullscreen: false,
        is_focused: false,
        is_main: false,
        is_tabbed: false,
        space_ids: Vec::new(),
        is_on_all_spaces: false,
        desktop_number: None,
        display_id: None,
        role: None,
        subrole: None,
        captured_at: Utc::now(),
    }
}
