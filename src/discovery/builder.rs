//! Fuses one filtered window with its enrichment sources into a snapshot

use crate::discovery::filter::FilterInput;
use crate::discovery::snapshot::WindowSnapshot;
use crate::discovery::title_cache::TitleCache;
use crate::macos::spaces::{display_containing, DisplaySpaceInfo};
use chrono::{DateTime, Utc};

/// Per-pass context shared by every window built in that pass
#[derive(Debug)]
pub struct InfoBuilder<'a> {
    displays: &'a [DisplaySpaceInfo],
    captured_at: DateTime<Utc>,
    use_title_cache: bool,
}

impl<'a> InfoBuilder<'a> {
    pub fn new(
        displays: &'a [DisplaySpaceInfo],
        captured_at: DateTime<Utc>,
        use_title_cache: bool,
    ) -> Self {
        Self {
            displays,
            captured_at,
            use_title_cache,
        }
    }

    pub fn build(&self, input: &FilterInput<'_>, titles: &mut TitleCache) -> WindowSnapshot {
        let window = input.window;
        let info = input.accessibility;
        let display = display_containing(self.displays, &window.bounds);

        WindowSnapshot {
            window_id: window.window_id,
            title: self.resolve_title(input, titles),
            bounds: window.bounds,
            alpha: window.alpha,
            is_on_screen: window.is_on_screen,
            layer: window.layer,
            pid: window.owner_pid,
            bundle_id: input.app.and_then(|app| app.bundle_id.clone()),
            app_name: input
                .app
                .map(|app| app.name.clone())
                .or_else(|| window.owner_name.clone())
                .unwrap_or_default(),
            is_minimized: info.map(|i| i.is_minimized).unwrap_or(false),
            is_hidden: info.map(|i| i.is_hidden).unwrap_or(false),
            is_fullscreen: info.map(|i| i.is_fullscreen).unwrap_or(false),
            is_focused: info.map(|i| i.is_focused).unwrap_or(false),
            is_main: info.map(|i| i.is_main).unwrap_or(false),
            is_tabbed: info.map(|i| i.is_tabbed).unwrap_or(false),
            space_ids: input.space_ids.to_vec(),
            is_on_all_spaces: input.space_ids.len() > 1,
            desktop_number: self.desktop_number(display, input.space_ids),
            display_id: display,
            role: info.and_then(|i| i.role.clone()),
            subrole: info.and_then(|i| i.subrole.clone()),
            captured_at: self.captured_at,
        }
    }

    /// Accessibility title, then window-server title, then the last title seen
    fn resolve_title(&self, input: &FilterInput<'_>, titles: &mut TitleCache) -> String {
        let window_id = input.window.window_id;
        let live = input
            .accessibility
            .and_then(|info| info.readable_title())
            .or_else(|| {
                input
                    .window
                    .title
                    .as_deref()
                    .filter(|title| !title.is_empty())
            });

        if let Some(title) = live {
            if self.use_title_cache {
                titles.insert(window_id, title);
            }
            return title.to_string();
        }

        if self.use_title_cache {
            if let Some(cached) = titles.get(window_id) {
                return cached.to_string();
            }
        }

        String::new()
    }

    fn desktop_number(&self, display: Option<u32>, space_ids: &[u64]) -> Option<usize> {
        let display = display?;
        let first = *space_ids.first()?;
        self.displays
            .iter()
            .find(|info| info.display_id == display)
            .and_then(|info| info.desktop_number(first))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::validator::CheckedWindow;
    use crate::macos::accessibility::AccessibilityWindowInfo;
    use crate::macos::core_graphics::Bounds;
    use crate::macos::process::AppInfo;

    fn checked(window_id: u32, title: Option<&str>) -> CheckedWindow {
        CheckedWindow {
            window_id,
            owner_pid: 50,
            owner_name: Some("Owner".into()),
            title: title.map(str::to_string),
            bounds: Bounds {
                x: 100.0,
                y: 100.0,
                width: 800.0,
                height: 600.0,
            },
            alpha: 1.0,
            layer: 0,
            is_on_screen: true,
        }
    }

    fn ax_titled(window_id: u32, title: &str) -> AccessibilityWindowInfo {
        AccessibilityWindowInfo {
            title: Some(title.into()),
            ..AccessibilityWindowInfo::new(window_id)
        }
    }

    fn build(
        window: &CheckedWindow,
        info: Option<&AccessibilityWindowInfo>,
        titles: &mut TitleCache,
    ) -> WindowSnapshot {
        let builder = InfoBuilder::new(&[], Utc::now(), true);
        let input = FilterInput {
            window,
            accessibility: info,
            app: None,
            space_ids: &[],
        };
        builder.build(&input, titles)
    }

    #[test]
    fn accessibility_title_wins_over_stale_cache() {
        let mut titles = TitleCache::default();
        titles.insert(1, "Stale");

        let window = checked(1, Some("Server title"));
        let snapshot = build(&window, Some(&ax_titled(1, "Fresh")), &mut titles);

        assert_eq!(snapshot.title, "Fresh");
        assert_eq!(titles.get(1), Some("Fresh"));
    }

    #[test]
    fn server_title_is_used_and_cached() {
        let mut titles = TitleCache::default();
        let window = checked(2, Some("Server title"));
        let snapshot = build(&window, Some(&ax_titled(2, "")), &mut titles);

        assert_eq!(snapshot.title, "Server title");
        assert_eq!(titles.get(2), Some("Server title"));
    }

    #[test]
    fn cached_title_covers_unreadable_windows() {
        let mut titles = TitleCache::default();
        titles.insert(3, "Remembered");

        let snapshot = build(&checked(3, None), None, &mut titles);
        assert_eq!(snapshot.title, "Remembered");

        let snapshot = build(&checked(4, None), None, &mut titles);
        assert_eq!(snapshot.title, "");
    }

    #[test]
    fn title_cache_can_be_disabled() {
        let mut titles = TitleCache::default();
        titles.insert(5, "Remembered");
        let builder = InfoBuilder::new(&[], Utc::now(), false);
        let window = checked(5, None);
        let input = FilterInput {
            window: &window,
            accessibility: None,
            app: None,
            space_ids: &[],
        };

        assert_eq!(builder.build(&input, &mut titles).title, "");
    }

    #[test]
    fn desktop_number_and_identity_come_from_sources() {
        let displays = vec![DisplaySpaceInfo {
            display_id: 1,
            uuid: None,
            current_space: 10,
            spaces: vec![10, 11, 12],
            bounds: Bounds {
                x: 0.0,
                y: 0.0,
                width: 1920.0,
                height: 1080.0,
            },
            is_primary: true,
        }];
        let builder = InfoBuilder::new(&displays, Utc::now(), true);
        let window = checked(6, None);
        let app = AppInfo::new(50, "Notes", Some("com.apple.Notes"));
        let input = FilterInput {
            window: &window,
            accessibility: None,
            app: Some(&app),
            space_ids: &[12],
        };

        let snapshot = builder.build(&input, &mut TitleCache::default());
        assert_eq!(snapshot.display_id, Some(1));
        assert_eq!(snapshot.desktop_number, Some(3));
        assert_eq!(snapshot.app_name, "Notes");
        assert_eq!(snapshot.bundle_id.as_deref(), Some("com.apple.Notes"));
        assert!(!snapshot.is_on_all_spaces);
    }
}
