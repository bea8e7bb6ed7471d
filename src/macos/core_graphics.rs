use crate::{Result, ScoutError};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// Rectangle in global display points (origin top-left)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Result<Self> {
        if width <= 0.0 || height <= 0.0 {
            return Err(ScoutError::Validation(
                "Window dimensions must be positive".to_string(),
            )
            .into());
        }

        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// One entry of the window server's window list, exactly as reported.
///
/// Nothing here has been checked yet; the discovery validator decides
/// whether a record is structurally sound.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawWindow {
    pub window_id: u32,
    pub owner_pid: i32,
    pub owner_name: Option<String>,
    pub title: Option<String>,
    pub bounds: Option<Bounds>,
    pub alpha: Option<f64>,
    pub layer: Option<i32>,
    pub is_on_screen: bool,
}

/// Abstraction over the low-level window enumeration call
pub trait WindowListProvider: Send + Sync {
    /// Snapshot every window the window server knows about
    fn capture(&self) -> Result<Vec<RawWindow>>;

    /// Find the owning process of a window with a full list scan
    fn owner_of(&self, window_id: u32) -> Result<Option<i32>> {
        Ok(self
            .capture()?
            .into_iter()
            .find(|window| window.window_id == window_id)
            .map(|window| window.owner_pid))
    }
}

/// Window list backed by `CGWindowListCopyWindowInfo`
#[derive(Debug, Clone, Copy)]
pub struct SystemWindowList {
    exclude_desktop_elements: bool,
}

impl SystemWindowList {
    pub fn new() -> Self {
        Self {
            exclude_desktop_elements: true,
        }
    }
}

impl Default for SystemWindowList {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowListProvider for SystemWindowList {
    fn capture(&self) -> Result<Vec<RawWindow>> {
        platform::capture(self.exclude_desktop_elements)
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::{Bounds, RawWindow};
    use crate::{Result, ScoutError};
    use core_foundation::base::{CFType, TCFType};
    use core_foundation::boolean::CFBoolean;
    use core_foundation::dictionary::CFDictionary;
    use core_foundation::number::CFNumber;
    use core_foundation::string::CFString;
    use core_foundation_sys::dictionary::CFDictionaryRef;
    use core_foundation_sys::string::CFStringRef;
    use core_graphics::geometry::CGRect;
    use core_graphics::window::{
        copy_window_info, kCGNullWindowID, kCGWindowAlpha, kCGWindowBounds,
        kCGWindowIsOnscreen, kCGWindowLayer, kCGWindowListExcludeDesktopElements,
        kCGWindowListOptionAll, kCGWindowName, kCGWindowNumber, kCGWindowOwnerName,
        kCGWindowOwnerPID,
    };

    type WindowDictionary = CFDictionary<CFString, CFType>;

    pub fn capture(exclude_desktop_elements: bool) -> Result<Vec<RawWindow>> {
        let mut options = kCGWindowListOptionAll;
        if exclude_desktop_elements {
            options |= kCGWindowListExcludeDesktopElements;
        }

        let windows = copy_window_info(options, kCGNullWindowID).ok_or_else(|| {
            ScoutError::ProviderFailure("CGWindowListCopyWindowInfo returned no list".into())
        })?;

        let records = windows
            .get_all_values()
            .into_iter()
            .filter(|entry| !entry.is_null())
            .map(|entry| {
                let dict: WindowDictionary =
                    unsafe { CFDictionary::wrap_under_get_rule(entry as CFDictionaryRef) };
                parse_record(&dict)
            })
            .collect();

        Ok(records)
    }

    fn parse_record(dict: &WindowDictionary) -> RawWindow {
        unsafe {
            RawWindow {
                window_id: number(dict, kCGWindowNumber)
                    .and_then(|n| n.to_i64())
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(0),
                owner_pid: number(dict, kCGWindowOwnerPID)
                    .and_then(|n| n.to_i32())
                    .unwrap_or(0),
                owner_name: string(dict, kCGWindowOwnerName),
                title: string(dict, kCGWindowName),
                bounds: bounds(dict),
                alpha: number(dict, kCGWindowAlpha).and_then(|n| n.to_f64()),
                layer: number(dict, kCGWindowLayer).and_then(|n| n.to_i32()),
                is_on_screen: value(dict, kCGWindowIsOnscreen)
                    .and_then(|v| v.downcast::<CFBoolean>())
                    .map(bool::from)
                    .unwrap_or(false),
            }
        }
    }

    unsafe fn value(dict: &WindowDictionary, key: CFStringRef) -> Option<CFType> {
        let key = CFString::wrap_under_get_rule(key);
        dict.find(&key).map(|item| (*item).clone())
    }

    unsafe fn number(dict: &WindowDictionary, key: CFStringRef) -> Option<CFNumber> {
        value(dict, key).and_then(|v| v.downcast::<CFNumber>())
    }

    unsafe fn string(dict: &WindowDictionary, key: CFStringRef) -> Option<String> {
        value(dict, key)
            .and_then(|v| v.downcast::<CFString>())
            .map(|s| s.to_string())
    }

    unsafe fn bounds(dict: &WindowDictionary) -> Option<Bounds> {
        let rect_dict = value(dict, kCGWindowBounds)?.downcast::<CFDictionary>()?;
        let rect = CGRect::from_dict_representation(&rect_dict)?;
        Some(Bounds {
            x: rect.origin.x,
            y: rect.origin.y,
            width: rect.size.width,
            height: rect.size.height,
        })
    }
}

#[cfg(not(target_os = "macos"))]
mod platform {
    use super::RawWindow;
    use crate::{Result, ScoutError};

    pub fn capture(_exclude_desktop_elements: bool) -> Result<Vec<RawWindow>> {
        Err(ScoutError::ProviderFailure(
            "window enumeration requires macOS".into(),
        )
        .into())
    }
}

/// In-memory window list for testing and offline tooling
#[derive(Debug, Default)]
pub struct InMemoryWindowList {
    windows: RwLock<Vec<RawWindow>>,
    failing: RwLock<bool>,
}

impl InMemoryWindowList {
    pub fn new_with(windows: Vec<RawWindow>) -> Self {
        Self {
            windows: RwLock::new(windows),
            failing: RwLock::new(false),
        }
    }

    pub fn replace(&self, windows: Vec<RawWindow>) {
        *self.windows.write().unwrap_or_else(PoisonError::into_inner) = windows;
    }

    /// Make every subsequent capture fail like a broken window server call
    pub fn set_failing(&self, failing: bool) {
        *self.failing.write().unwrap_or_else(PoisonError::into_inner) = failing;
    }
}

impl WindowListProvider for InMemoryWindowList {
    fn capture(&self) -> Result<Vec<RawWindow>> {
        if *self.failing.read().unwrap_or_else(PoisonError::into_inner) {
            return Err(ScoutError::ProviderFailure("simulated capture failure".into()).into());
        }
        Ok(self
            .windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(window_id: u32, owner_pid: i32) -> RawWindow {
        RawWindow {
            window_id,
            owner_pid,
            bounds: Some(Bounds::new(0.0, 0.0, 100.0, 100.0).unwrap()),
            ..RawWindow::default()
        }
    }

    #[test]
    fn bounds_validation_rejects_invalid_sizes() {
        let result = Bounds::new(0.0, 0.0, -1.0, 10.0);
        assert!(result.is_err());
    }

    #[test]
    fn bounds_center_and_contains() {
        let bounds = Bounds::new(100.0, 50.0, 200.0, 100.0).unwrap();
        assert_eq!(bounds.center(), (200.0, 100.0));
        assert!(bounds.contains(100.0, 50.0));
        assert!(!bounds.contains(300.0, 100.0));
    }

    #[test]
    fn owner_lookup_scans_full_list() {
        let provider = InMemoryWindowList::new_with(vec![raw(10, 501), raw(11, 502)]);
        assert_eq!(provider.owner_of(11).unwrap(), Some(502));
        assert_eq!(provider.owner_of(99).unwrap(), None);
    }

    #[test]
    fn failing_provider_surfaces_error() {
        let provider = InMemoryWindowList::new_with(vec![raw(10, 501)]);
        provider.set_failing(true);
        assert!(provider.capture().is_err());
    }
}
