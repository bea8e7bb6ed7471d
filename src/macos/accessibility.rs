use crate::{Result, ScoutError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// Subrole of an ordinary application window
pub const STANDARD_WINDOW_SUBROLE: &str = "AXStandardWindow";
/// Subrole of a dialog or sheet-like window
pub const DIALOG_SUBROLE: &str = "AXDialog";

/// Per-window state read from the accessibility tree during one discovery pass
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessibilityWindowInfo {
    pub window_id: u32,
    pub title: Option<String>,
    pub role: Option<String>,
    pub subrole: Option<String>,
    pub is_minimized: bool,
    pub is_hidden: bool,
    pub is_fullscreen: bool,
    pub is_focused: bool,
    pub is_main: bool,
    pub is_tabbed: bool,
}

impl AccessibilityWindowInfo {
    pub fn new(window_id: u32) -> Self {
        Self {
            window_id,
            ..Self::default()
        }
    }

    /// Whether the subrole marks an ordinary window or dialog
    pub fn has_standard_subrole(&self) -> bool {
        matches!(
            self.subrole.as_deref(),
            Some(STANDARD_WINDOW_SUBROLE) | Some(DIALOG_SUBROLE)
        )
    }

    /// Accessibility title, if it is present and non-empty
    pub fn readable_title(&self) -> Option<&str> {
        self.title.as_deref().filter(|title| !title.is_empty())
    }
}

/// Tracks accessibility permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Unknown,
    Granted,
    Denied,
}

/// Handle to the accessibility element of one specific window
pub trait WindowElement: Send + Sync + fmt::Debug {
    fn window_id(&self) -> u32;

    fn pid(&self) -> i32;

    /// Perform the raise action on this exact window
    fn raise(&self) -> Result<()>;
}

pub type ElementHandle = Arc<dyn WindowElement>;

/// Everything one process enumeration produced
#[derive(Debug, Default, Clone)]
pub struct ProcessWindows {
    pub windows: HashMap<u32, AccessibilityWindowInfo>,
    pub elements: Vec<ElementHandle>,
}

/// Abstraction for interacting with macOS Accessibility APIs
pub trait AccessibilityProvider: Send + Sync {
    /// Retrieve permission status without prompting the user
    fn permission_status(&self) -> PermissionStatus;

    /// Ensure accessibility permissions are granted
    fn ensure_permissions(&self) -> Result<()> {
        match self.permission_status() {
            PermissionStatus::Granted => Ok(()),
            PermissionStatus::Unknown | PermissionStatus::Denied => {
                Err(ScoutError::PermissionDenied(
                    "Accessibility permission is required to read window state".into(),
                )
                .into())
            }
        }
    }

    /// Enumerate the windows of one process, stopping once `budget` is spent
    fn windows_for_process(&self, pid: i32, budget: Duration) -> Result<ProcessWindows>;
}

/// Window-id keyed element store shared between discovery and activation
#[derive(Default)]
pub struct ElementCache {
    entries: RwLock<HashMap<u32, ElementHandle>>,
}

impl fmt::Debug for ElementCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementCache")
            .field("len", &self.len())
            .finish()
    }
}

impl ElementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_all(&self, elements: impl IntoIterator<Item = ElementHandle>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for element in elements {
            entries.insert(element.window_id(), element);
        }
    }

    pub fn get(&self, window_id: u32) -> Option<ElementHandle> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&window_id)
            .cloned()
    }

    /// Drop every element owned by `pid`, returning how many were removed
    pub fn remove_process(&self, pid: i32) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, element| element.pid() != pid);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Provider backed by the system accessibility API
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAccessibilityProvider;

impl SystemAccessibilityProvider {
    pub fn new() -> Self {
        Self
    }
}

impl AccessibilityProvider for SystemAccessibilityProvider {
    fn permission_status(&self) -> PermissionStatus {
        match crate::macos::permissions::is_accessibility_permission_granted() {
            Ok(true) => PermissionStatus::Granted,
            Ok(false) => PermissionStatus::Denied,
            Err(_) => PermissionStatus::Unknown,
        }
    }

    fn windows_for_process(&self, pid: i32, budget: Duration) -> Result<ProcessWindows> {
        platform::enumerate(pid, budget)
    }
}

#[cfg(target_os = "macos")]
mod platform {
    use super::{AccessibilityWindowInfo, ElementHandle, ProcessWindows, WindowElement};
    use crate::{Result, ScoutError};
    use accessibility_sys::{
        kAXChildrenAttribute, kAXErrorSuccess, kAXFocusedAttribute, kAXHiddenAttribute,
        kAXMainAttribute, kAXMinimizedAttribute, kAXRaiseAction, kAXRoleAttribute,
        kAXSubroleAttribute, kAXTitleAttribute, kAXWindowsAttribute, AXError,
        AXUIElementCopyAttributeValue, AXUIElementCreateApplication, AXUIElementPerformAction,
        AXUIElementRef, AXUIElementSetMessagingTimeout,
    };
    use core_foundation::array::{CFArray, CFArrayRef};
    use core_foundation::base::{CFRelease, CFRetain, CFType, CFTypeRef, TCFType};
    use core_foundation::boolean::CFBoolean;
    use core_foundation::string::CFString;
    use std::ffi::c_void;
    use std::ptr;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tracing::debug;

    const FULLSCREEN_ATTRIBUTE: &str = "AXFullScreen";
    const TABS_ATTRIBUTE: &str = "AXTabs";
    const TAB_GROUP_ROLE: &str = "AXTabGroup";
    const MIN_MESSAGING_TIMEOUT_SECS: f32 = 0.01;

    #[link(name = "ApplicationServices", kind = "framework")]
    extern "C" {
        /// Private call mapping an AX window element to its window server id.
        fn _AXUIElementGetWindow(element: AXUIElementRef, id: *mut u32) -> AXError;
    }

    /// Retained AX element of one window
    #[derive(Debug)]
    struct AxWindowElement {
        element: AXUIElementRef,
        window_id: u32,
        pid: i32,
    }

    // AXUIElementRef is an immutable CF object; messaging through it is thread-safe.
    unsafe impl Send for AxWindowElement {}
    unsafe impl Sync for AxWindowElement {}

    impl Drop for AxWindowElement {
        fn drop(&mut self) {
            unsafe { CFRelease(self.element as CFTypeRef) };
        }
    }

    impl WindowElement for AxWindowElement {
        fn window_id(&self) -> u32 {
            self.window_id
        }

        fn pid(&self) -> i32 {
            self.pid
        }

        fn raise(&self) -> Result<()> {
            let action = CFString::new(kAXRaiseAction);
            let result =
                unsafe { AXUIElementPerformAction(self.element, action.as_concrete_TypeRef()) };
            if result != kAXErrorSuccess {
                return Err(ScoutError::ProviderFailure(format!(
                    "AXRaise failed for window {} (AXError: {})",
                    self.window_id, result
                ))
                .into());
            }
            Ok(())
        }
    }

    pub fn enumerate(pid: i32, budget: Duration) -> Result<ProcessWindows> {
        let started = Instant::now();
        let mut result = ProcessWindows::default();

        // SAFETY: Create Rule, released at the end of this function.
        let app = unsafe { AXUIElementCreateApplication(pid) };
        if app.is_null() {
            return Ok(result);
        }

        unsafe {
            AXUIElementSetMessagingTimeout(
                app,
                budget.as_secs_f32().max(MIN_MESSAGING_TIMEOUT_SECS),
            );
        }

        let app_hidden = bool_attribute(app, kAXHiddenAttribute).unwrap_or(false);

        if let Some(windows) = array_attribute(app, kAXWindowsAttribute) {
            for item in windows.iter() {
                if started.elapsed() > budget {
                    debug!(
                        pid,
                        collected = result.windows.len(),
                        "Accessibility budget exhausted"
                    );
                    break;
                }

                let element = item.as_CFTypeRef() as AXUIElementRef;
                let mut window_id: u32 = 0;
                let status = unsafe { _AXUIElementGetWindow(element, &mut window_id) };
                if status != kAXErrorSuccess || window_id == 0 {
                    continue;
                }

                let info = AccessibilityWindowInfo {
                    window_id,
                    title: string_attribute(element, kAXTitleAttribute),
                    role: string_attribute(element, kAXRoleAttribute),
                    subrole: string_attribute(element, kAXSubroleAttribute),
                    is_minimized: bool_attribute(element, kAXMinimizedAttribute)
                        .unwrap_or(false),
                    is_hidden: app_hidden,
                    is_fullscreen: bool_attribute(element, FULLSCREEN_ATTRIBUTE)
                        .unwrap_or(false),
                    is_focused: bool_attribute(element, kAXFocusedAttribute).unwrap_or(false),
                    is_main: bool_attribute(element, kAXMainAttribute).unwrap_or(false),
                    is_tabbed: has_tab_group(element),
                };
                result.windows.insert(window_id, info);

                unsafe { CFRetain(element as CFTypeRef) };
                let handle: ElementHandle = Arc::new(AxWindowElement {
                    element,
                    window_id,
                    pid,
                });
                result.elements.push(handle);
            }
        }

        unsafe { CFRelease(app as CFTypeRef) };
        Ok(result)
    }

    fn copy_attribute(element: AXUIElementRef, attribute: &str) -> Option<CFType> {
        let name = CFString::new(attribute);
        let mut value: CFTypeRef = ptr::null();

        // SAFETY: Copy Rule; ownership moves into the returned CFType.
        let status =
            unsafe { AXUIElementCopyAttributeValue(element, name.as_concrete_TypeRef(), &mut value) };
        if status != kAXErrorSuccess || value.is_null() {
            return None;
        }

        Some(unsafe { CFType::wrap_under_create_rule(value) })
    }

    fn string_attribute(element: AXUIElementRef, attribute: &str) -> Option<String> {
        copy_attribute(element, attribute)
            .and_then(|value| value.downcast::<CFString>())
            .map(|value| value.to_string())
    }

    fn bool_attribute(element: AXUIElementRef, attribute: &str) -> Option<bool> {
        copy_attribute(element, attribute)
            .and_then(|value| value.downcast::<CFBoolean>())
            .map(bool::from)
    }

    fn array_attribute(element: AXUIElementRef, attribute: &str) -> Option<CFArray<CFType>> {
        let value = copy_attribute(element, attribute)?;
        if !value.instance_of::<CFArray<*const c_void>>() {
            return None;
        }
        // SAFETY: type checked above; get rule because `value` keeps its own retain.
        Some(unsafe { CFArray::wrap_under_get_rule(value.as_CFTypeRef() as CFArrayRef) })
    }

    /// Native window tabs surface as an AXTabGroup child with more than one tab
    fn has_tab_group(element: AXUIElementRef) -> bool {
        let Some(children) = array_attribute(element, kAXChildrenAttribute) else {
            return false;
        };

        children.iter().any(|child| {
            let child = child.as_CFTypeRef() as AXUIElementRef;
            string_attribute(child, kAXRoleAttribute).as_deref() == Some(TAB_GROUP_ROLE)
                && array_attribute(child, TABS_ATTRIBUTE)
                    .map(|tabs| tabs.len() > 1)
                    .unwrap_or(false)
        })
    }
}

#[cfg(not(target_os = "macos"))]
mod platform {
    use super::ProcessWindows;
    use crate::Result;
    use std::time::Duration;

    pub fn enumerate(_pid: i32, _budget: Duration) -> Result<ProcessWindows> {
        Ok(ProcessWindows::default())
    }
}

/// Element fake that records how often it was raised
#[derive(Debug)]
pub struct InMemoryElement {
    window_id: u32,
    pid: i32,
    raises: Arc<AtomicUsize>,
}

impl WindowElement for InMemoryElement {
    fn window_id(&self) -> u32 {
        self.window_id
    }

    fn pid(&self) -> i32 {
        self.pid
    }

    fn raise(&self) -> Result<()> {
        self.raises.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Simple in-memory provider used for testing the higher level services
#[derive(Debug)]
pub struct InMemoryAccessibilityProvider {
    processes: RwLock<HashMap<i32, Vec<AccessibilityWindowInfo>>>,
    status: RwLock<PermissionStatus>,
    raises: RwLock<HashMap<u32, Arc<AtomicUsize>>>,
}

impl InMemoryAccessibilityProvider {
    pub fn new_with(processes: Vec<(i32, Vec<AccessibilityWindowInfo>)>) -> Self {
        let provider = Self::default();
        provider.set_permission_status(PermissionStatus::Granted);
        {
            let mut map = provider
                .processes
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for (pid, windows) in processes {
                map.entry(pid).or_default().extend(windows);
            }
        }
        provider
    }

    pub fn set_permission_status(&self, status: PermissionStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Number of raise actions performed on `window_id`
    pub fn raise_count(&self, window_id: u32) -> usize {
        self.raises
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&window_id)
            .map(|counter| counter.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Total raise actions performed on any window
    pub fn total_raises(&self) -> usize {
        self.raises
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|counter| counter.load(Ordering::SeqCst))
            .sum()
    }

    fn counter_for(&self, window_id: u32) -> Arc<AtomicUsize> {
        self.raises
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(window_id)
            .or_default()
            .clone()
    }
}

impl Default for InMemoryAccessibilityProvider {
    fn default() -> Self {
        Self {
            processes: RwLock::new(HashMap::new()),
            status: RwLock::new(PermissionStatus::Unknown),
            raises: RwLock::new(HashMap::new()),
        }
    }
}

impl AccessibilityProvider for InMemoryAccessibilityProvider {
    fn permission_status(&self) -> PermissionStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn windows_for_process(&self, pid: i32, _budget: Duration) -> Result<ProcessWindows> {
        let windows = self
            .processes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pid)
            .cloned()
            .unwrap_or_default();

        let mut result = ProcessWindows::default();
        for info in windows {
            let element: ElementHandle = Arc::new(InMemoryElement {
                window_id: info.window_id,
                pid,
                raises: self.counter_for(info.window_id),
            });
            result.elements.push(element);
            result.windows.insert(info.window_id, info);
        }
        debug!(pid, windows = result.windows.len(), "In-memory accessibility enumeration");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(window_id: u32, subrole: Option<&str>) -> AccessibilityWindowInfo {
        AccessibilityWindowInfo {
            window_id,
            title: Some(format!("Window {window_id}")),
            subrole: subrole.map(str::to_string),
            ..AccessibilityWindowInfo::default()
        }
    }

    #[test]
    fn standard_subrole_accepts_windows_and_dialogs() {
        assert!(window(1, Some(STANDARD_WINDOW_SUBROLE)).has_standard_subrole());
        assert!(window(2, Some(DIALOG_SUBROLE)).has_standard_subrole());
        assert!(!window(3, Some("AXFloatingWindow")).has_standard_subrole());
        assert!(!window(4, None).has_standard_subrole());
    }

    #[test]
    fn readable_title_ignores_empty_strings() {
        let mut info = window(1, None);
        info.title = Some(String::new());
        assert_eq!(info.readable_title(), None);
    }

    #[test]
    fn in_memory_provider_respects_permission_status() {
        let provider = InMemoryAccessibilityProvider::default();
        provider.set_permission_status(PermissionStatus::Denied);

        let result = provider.ensure_permissions();
        assert!(result.is_err());
    }

    #[test]
    fn element_lookup_finds_exact_window() {
        let provider = InMemoryAccessibilityProvider::new_with(vec![(
            42,
            vec![window(1, None), window(2, None)],
        )]);

        let element = provider
            .windows_for_process(42, Duration::from_millis(20))
            .unwrap()
            .elements
            .into_iter()
            .find(|element| element.window_id() == 2)
            .unwrap();
        element.raise().unwrap();

        assert_eq!(provider.raise_count(2), 1);
        assert_eq!(provider.raise_count(1), 0);
    }

    #[test]
    fn element_cache_recovers_from_poisoned_lock() {
        let provider = InMemoryAccessibilityProvider::new_with(vec![(3, vec![window(30, None)])]);
        let cache = Arc::new(ElementCache::new());
        let poisoner = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.entries.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        cache.insert_all(
            provider
                .windows_for_process(3, Duration::from_millis(20))
                .unwrap()
                .elements,
        );
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.remove_process(3), 1);
    }

    #[test]
    fn element_cache_prunes_by_process() {
        let provider = InMemoryAccessibilityProvider::new_with(vec![
            (1, vec![window(10, None), window(11, None)]),
            (2, vec![window(20, None)]),
        ]);
        let cache = ElementCache::new();
        for pid in [1, 2] {
            let windows = provider
                .windows_for_process(pid, Duration::from_millis(20))
                .unwrap();
            cache.insert_all(windows.elements);
        }

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.remove_process(1), 2);
        assert!(cache.get(10).is_none());
        assert!(cache.get(20).is_some());
    }
}
