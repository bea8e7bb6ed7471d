//! Virtual desktop (space) and display membership.
//!
//! Every query goes through the SkyLight capability probe. When the private
//! API is missing the provider answers with empty sets and zero ids, never
//! an error.

use crate::macos::core_graphics::Bounds;
use crate::macos::skylight::{Availability, ManagedDisplay};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Identifier SkyLight uses when all displays share one set of spaces
const SHARED_DISPLAY_IDENTIFIER: &str = "Main";

/// One display with its ordered spaces, rebuilt for every query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplaySpaceInfo {
    pub display_id: u32,
    /// Absent when the display reports no well-formed UUID
    pub uuid: Option<Uuid>,
    pub current_space: u64,
    pub spaces: Vec<u64>,
    pub bounds: Bounds,
    pub is_primary: bool,
}

impl DisplaySpaceInfo {
    /// 1-indexed position of `space_id` on this display
    pub fn desktop_number(&self, space_id: u64) -> Option<usize> {
        self.spaces
            .iter()
            .position(|candidate| *candidate == space_id)
            .map(|index| index + 1)
    }
}

/// Display whose bounds contain the center of `window`
pub fn display_containing(displays: &[DisplaySpaceInfo], window: &Bounds) -> Option<u32> {
    let (x, y) = window.center();
    displays
        .iter()
        .find(|display| display.bounds.contains(x, y))
        .map(|display| display.display_id)
}

/// Abstraction over space and display membership queries
pub trait SpaceProvider: Send + Sync {
    fn is_available(&self) -> bool;

    /// Space ids containing `window_id`; empty when unknown
    fn spaces_for_window(&self, window_id: u32) -> Vec<u64>;

    /// The globally active space, or 0 when unknown
    fn active_space(&self) -> u64;

    /// One active space id per display
    fn active_spaces(&self) -> Vec<u64>;

    fn displays(&self) -> Vec<DisplaySpaceInfo>;
}

/// Physical display geometry reported by Core Graphics
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayGeometry {
    pub display_id: u32,
    pub uuid: String,
    pub bounds: Bounds,
    pub is_primary: bool,
}

/// Join the managed-spaces table with physical display geometry
pub fn merge_displays(
    managed: &[ManagedDisplay],
    geometry: &[DisplayGeometry],
) -> Vec<DisplaySpaceInfo> {
    managed
        .iter()
        .filter_map(|entry| {
            let display = if entry.identifier == SHARED_DISPLAY_IDENTIFIER {
                geometry.iter().find(|display| display.is_primary)
            } else {
                geometry
                    .iter()
                    .find(|display| display.uuid.eq_ignore_ascii_case(&entry.identifier))
            }?;

            Some(DisplaySpaceInfo {
                display_id: display.display_id,
                uuid: Uuid::parse_str(&display.uuid).ok(),
                current_space: entry.current_space,
                spaces: entry.spaces.clone(),
                bounds: display.bounds,
                is_primary: display.is_primary,
            })
        })
        .collect()
}

/// Space provider backed by SkyLight and Core Graphics
#[derive(Debug, Clone)]
pub struct SystemSpaceProvider {
    skylight: Availability,
}

impl SystemSpaceProvider {
    pub fn new(skylight: Availability) -> Self {
        Self { skylight }
    }
}

impl SpaceProvider for SystemSpaceProvider {
    fn is_available(&self) -> bool {
        self.skylight.is_available()
    }

    fn spaces_for_window(&self, window_id: u32) -> Vec<u64> {
        self.skylight
            .get()
            .map(|skylight| skylight.spaces_for_window(window_id))
            .unwrap_or_default()
    }

    fn active_space(&self) -> u64 {
        self.skylight
            .get()
            .map(|skylight| skylight.active_space())
            .unwrap_or(0)
    }

    fn active_spaces(&self) -> Vec<u64> {
        let Some(skylight) = self.skylight.get() else {
            return Vec::new();
        };
        skylight
            .managed_display_spaces()
            .into_iter()
            .map(|display| display.current_space)
            .filter(|space| *space != 0)
            .collect()
    }

    fn displays(&self) -> Vec<DisplaySpaceInfo> {
        let Some(skylight) = self.skylight.get() else {
            return Vec::new();
        };
        let managed = skylight.managed_display_spaces();
        let geometry = platform::display_geometry();
        let displays = merge_displays(&managed, &geometry);
        debug!(
            managed = managed.len(),
            physical = geometry.len(),
            merged = displays.len(),
            "Rebuilt display space table"
        );
        displays
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::DisplayGeometry;
    use crate::macos::core_graphics::Bounds;
    use core_foundation::base::{CFRelease, CFTypeRef, TCFType};
    use core_foundation::string::{CFString, CFStringRef};
    use core_foundation_sys::base::CFAllocatorRef;
    use core_graphics::display::CGDisplay;
    use std::ffi::c_void;

    type CFUUIDRef = *const c_void;

    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        fn CGDisplayCreateUUIDFromDisplayID(display: u32) -> CFUUIDRef;
    }

    #[link(name = "CoreFoundation", kind = "framework")]
    extern "C" {
        fn CFUUIDCreateString(alloc: CFAllocatorRef, uuid: CFUUIDRef) -> CFStringRef;
    }

    pub fn display_geometry() -> Vec<DisplayGeometry> {
        let Ok(ids) = CGDisplay::active_displays() else {
            return Vec::new();
        };

        ids.into_iter()
            .map(|display_id| {
                let display = CGDisplay::new(display_id);
                let rect = display.bounds();
                DisplayGeometry {
                    display_id,
                    uuid: display_uuid(display_id).unwrap_or_default(),
                    bounds: Bounds {
                        x: rect.origin.x,
                        y: rect.origin.y,
                        width: rect.size.width,
                        height: rect.size.height,
                    },
                    is_primary: display.is_main(),
                }
            })
            .collect()
    }

    fn display_uuid(display_id: u32) -> Option<String> {
        unsafe {
            let uuid = CGDisplayCreateUUIDFromDisplayID(display_id);
            if uuid.is_null() {
                return None;
            }
            let raw = CFUUIDCreateString(std::ptr::null(), uuid);
            CFRelease(uuid as CFTypeRef);
            if raw.is_null() {
                return None;
            }
            Some(CFString::wrap_under_create_rule(raw).to_string())
        }
    }
}

#[cfg(not(target_os = "macos"))]
mod platform {
    use super::DisplayGeometry;

    pub fn display_geometry() -> Vec<DisplayGeometry> {
        Vec::new()
    }
}

/// In-memory space provider for tests
#[derive(Debug, Default)]
pub struct InMemorySpaceProvider {
    available: bool,
    window_spaces: RwLock<HashMap<u32, Vec<u64>>>,
    displays: RwLock<Vec<DisplaySpaceInfo>>,
}

impl InMemorySpaceProvider {
    pub fn new_with(displays: Vec<DisplaySpaceInfo>, window_spaces: Vec<(u32, Vec<u64>)>) -> Self {
        Self {
            available: true,
            window_spaces: RwLock::new(window_spaces.into_iter().collect()),
            displays: RwLock::new(displays),
        }
    }

    /// Provider that behaves like a system without the private API
    pub fn unavailable() -> Self {
        Self::default()
    }
}

impl SpaceProvider for InMemorySpaceProvider {
    fn is_available(&self) -> bool {
        self.available
    }

    fn spaces_for_window(&self, window_id: u32) -> Vec<u64> {
        if !self.available {
            return Vec::new();
        }
        self.window_spaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&window_id)
            .cloned()
            .unwrap_or_default()
    }

    fn active_space(&self) -> u64 {
        self.active_spaces().first().copied().unwrap_or(0)
    }

    fn active_spaces(&self) -> Vec<u64> {
        if !self.available {
            return Vec::new();
        }
        self.displays
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|display| display.current_space)
            .collect()
    }

    fn displays(&self) -> Vec<DisplaySpaceInfo> {
        if !self.available {
            return Vec::new();
        }
        self.displays
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
