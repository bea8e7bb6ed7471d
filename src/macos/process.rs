//! Running-process metadata via `NSRunningApplication`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// How an application participates in the Dock and app switcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationPolicy {
    Regular,
    Accessory,
    Prohibited,
    Unknown,
}

impl From<isize> for ActivationPolicy {
    fn from(raw: isize) -> Self {
        match raw {
            0 => ActivationPolicy::Regular,
            1 => ActivationPolicy::Accessory,
            2 => ActivationPolicy::Prohibited,
            _ => ActivationPolicy::Unknown,
        }
    }
}

/// Identity of a running application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub pid: i32,
    pub name: String,
    pub bundle_id: Option<String>,
    pub is_hidden: bool,
    pub activation_policy: ActivationPolicy,
}

impl AppInfo {
    pub fn new(pid: i32, name: impl Into<String>, bundle_id: Option<&str>) -> Self {
        Self {
            pid,
            name: name.into(),
            bundle_id: bundle_id.map(str::to_string),
            is_hidden: false,
            activation_policy: ActivationPolicy::Regular,
        }
    }
}

/// Abstraction over the running-application registry.
///
/// The system implementation must only be called from the UI-confined
/// thread.
pub trait ProcessRegistry: Send + Sync {
    fn app_info(&self, pid: i32) -> Option<AppInfo>;

    fn running_applications(&self) -> Vec<AppInfo>;

    /// Process ids of every running instance of `bundle_id`
    fn pids_for_bundle(&self, bundle_id: &str) -> Vec<i32> {
        self.running_applications()
            .into_iter()
            .filter(|app| app.bundle_id.as_deref() == Some(bundle_id))
            .map(|app| app.pid)
            .collect()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessRegistry;

impl SystemProcessRegistry {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRegistry for SystemProcessRegistry {
    fn app_info(&self, pid: i32) -> Option<AppInfo> {
        platform::app_info(pid)
    }

    fn running_applications(&self) -> Vec<AppInfo> {
        platform::running_applications()
    }
}

#[cfg(target_os = "macos")]
pub(crate) mod platform {
    use super::{ActivationPolicy, AppInfo};
    use cocoa::base::{id, nil};
    use cocoa::foundation::NSAutoreleasePool;
    use objc::runtime::{BOOL, NO};
    use objc::{class, msg_send, sel, sel_impl};
    use std::ffi::CStr;
    use std::os::raw::c_char;

    pub fn app_info(pid: i32) -> Option<AppInfo> {
        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let app: id = msg_send![
                class!(NSRunningApplication),
                runningApplicationWithProcessIdentifier: pid
            ];
            let info = if app == nil { None } else { Some(describe(app)) };
            let _: () = msg_send![pool, drain];
            info
        }
    }

    pub fn running_applications() -> Vec<AppInfo> {
        unsafe {
            let pool = NSAutoreleasePool::new(nil);
            let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
            let apps: id = msg_send![workspace, runningApplications];
            let count: usize = if apps == nil { 0 } else { msg_send![apps, count] };

            let mut result = Vec::with_capacity(count);
            for index in 0..count {
                let app: id = msg_send![apps, objectAtIndex: index];
                if app != nil {
                    result.push(describe(app));
                }
            }
            let _: () = msg_send![pool, drain];
            result
        }
    }

    /// Read identity fields from an `NSRunningApplication`
    pub unsafe fn describe(app: id) -> AppInfo {
        let pid: i32 = msg_send![app, processIdentifier];
        let name: id = msg_send![app, localizedName];
        let bundle: id = msg_send![app, bundleIdentifier];
        let hidden: BOOL = msg_send![app, isHidden];
        let policy: isize = msg_send![app, activationPolicy];

        AppInfo {
            pid,
            name: ns_string(name).unwrap_or_default(),
            bundle_id: ns_string(bundle),
            is_hidden: hidden != NO,
            activation_policy: ActivationPolicy::from(policy),
        }
    }

    pub unsafe fn ns_string(value: id) -> Option<String> {
        if value == nil {
            return None;
        }
        let bytes: *const c_char = msg_send![value, UTF8String];
        if bytes.is_null() {
            return None;
        }
        Some(CStr::from_ptr(bytes).to_string_lossy().into_owned())
    }
}

#[cfg(not(target_os = "macos"))]
pub(crate) mod platform {
    use super::AppInfo;

    pub fn app_info(_pid: i32) -> Option<AppInfo> {
        None
    }

    pub fn running_applications() -> Vec<AppInfo> {
        Vec::new()
    }
}

/// In-memory registry for tests
#[derive(Debug, Default)]
pub struct InMemoryProcessRegistry {
    apps: RwLock<HashMap<i32, AppInfo>>,
}

impl InMemoryProcessRegistry {
    pub fn new_with(apps: Vec<AppInfo>) -> Self {
        Self {
            apps: RwLock::new(apps.into_iter().map(|app| (app.pid, app)).collect()),
        }
    }

    pub fn insert(&self, app: AppInfo) {
        self.apps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(app.pid, app);
    }

    pub fn remove(&self, pid: i32) {
        self.apps.write().unwrap_or_else(PoisonError::into_inner).remove(&pid);
    }
}

impl ProcessRegistry for InMemoryProcessRegistry {
    fn app_info(&self, pid: i32) -> Option<AppInfo> {
        self.apps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pid)
            .cloned()
    }

    fn running_applications(&self) -> Vec<AppInfo> {
        let mut apps: Vec<AppInfo> = self
            .apps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        apps.sort_by_key(|app| app.pid);
        apps
    }
}
