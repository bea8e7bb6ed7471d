//! Capability-gated access to the private SkyLight window-server entry points.
//!
//! Nothing outside this module binds a private symbol. Loading checks the OS
//! version first, then resolves every required symbol; if any step fails the
//! caller gets an explicit unavailable reason instead of a crash.

use std::sync::Arc;

/// Oldest macOS release whose SkyLight exports match the signatures below
pub const MINIMUM_OS_VERSION: (u32, u32) = (10, 15);

/// Framework binary opened with `dlopen`
pub const SKYLIGHT_PATH: &str = match option_env!("WINSCOUT_SKYLIGHT_PATH") {
    Some(path) => path,
    None => "/System/Library/PrivateFrameworks/SkyLight.framework/SkyLight",
};

/// Parse `"14.5"` / `"10.15.7"` into `(major, minor)`
pub fn parse_os_version(raw: &str) -> Option<(u32, u32)> {
    let mut parts = raw.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(minor) => minor.parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

pub fn meets_minimum(version: (u32, u32)) -> bool {
    version >= MINIMUM_OS_VERSION
}

/// One display entry of the managed-spaces table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedDisplay {
    /// Display UUID string, or `"Main"` when displays share spaces
    pub identifier: String,
    pub current_space: u64,
    pub spaces: Vec<u64>,
}

/// Result of probing for the private API
#[derive(Clone)]
pub enum Availability {
    Available(Arc<SkyLight>),
    Unavailable(String),
}

impl std::fmt::Debug for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Availability::Available(_) => f.write_str("Available"),
            Availability::Unavailable(reason) => write!(f, "Unavailable({reason})"),
        }
    }
}

impl Availability {
    /// Probe the running system once
    pub fn probe() -> Self {
        match SkyLight::load() {
            Ok(skylight) => Availability::Available(Arc::new(skylight)),
            Err(reason) => {
                tracing::warn!(%reason, "SkyLight private API unavailable");
                Availability::Unavailable(reason)
            }
        }
    }

    pub fn get(&self) -> Option<&Arc<SkyLight>> {
        match self {
            Availability::Available(skylight) => Some(skylight),
            Availability::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.get().is_some()
    }
}

pub use platform::SkyLight;

#[cfg(target_os = "macos")]
mod platform {
    use super::{meets_minimum, parse_os_version, ManagedDisplay, SKYLIGHT_PATH};
    use core_foundation::array::{CFArray, CFArrayRef};
    use core_foundation::base::{CFType, TCFType};
    use core_foundation::dictionary::CFDictionary;
    use core_foundation::number::CFNumber;
    use core_foundation::string::CFString;
    use std::ffi::{c_void, CStr, CString};

    /// Mask covering current, other and user spaces
    const ALL_SPACES_MASK: i32 = 0x7;
    /// `kCPSUserGenerated`: treat the front switch as user initiated
    const USER_GENERATED_FRONT: u32 = 0x200;

    const DISPLAY_IDENTIFIER_KEY: &str = "Display Identifier";
    const CURRENT_SPACE_KEY: &str = "Current Space";
    const SPACES_KEY: &str = "Spaces";
    const SPACE_ID_KEY: &str = "ManagedSpaceID";

    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    struct ProcessSerialNumber {
        high: u32,
        low: u32,
    }

    type MainConnectionIdFn = unsafe extern "C" fn() -> i32;
    type CopySpacesForWindowsFn = unsafe extern "C" fn(i32, i32, CFArrayRef) -> CFArrayRef;
    type GetActiveSpaceFn = unsafe extern "C" fn(i32) -> u64;
    type CopyManagedDisplaySpacesFn = unsafe extern "C" fn(i32) -> CFArrayRef;
    type SetFrontProcessWithOptionsFn =
        unsafe extern "C" fn(*const ProcessSerialNumber, u32, u32) -> i32;
    type PostEventRecordToFn = unsafe extern "C" fn(*const ProcessSerialNumber, *const u8) -> i32;
    type GetProcessForPidFn = unsafe extern "C" fn(i32, *mut ProcessSerialNumber) -> i32;

    /// Resolved SkyLight entry points plus the main window-server connection
    pub struct SkyLight {
        connection: i32,
        copy_spaces_for_windows: CopySpacesForWindowsFn,
        get_active_space: GetActiveSpaceFn,
        copy_managed_display_spaces: CopyManagedDisplaySpacesFn,
        set_front_process_with_options: SetFrontProcessWithOptionsFn,
        post_event_record_to: PostEventRecordToFn,
        get_process_for_pid: GetProcessForPidFn,
    }

    // Function pointers and an integer connection id.
    unsafe impl Send for SkyLight {}
    unsafe impl Sync for SkyLight {}

    impl SkyLight {
        pub fn load() -> Result<Self, String> {
            let version = os_version().ok_or("unable to read macOS version")?;
            if !meets_minimum(version) {
                return Err(format!(
                    "macOS {}.{} predates the supported SkyLight interface",
                    version.0, version.1
                ));
            }

            let path = CString::new(SKYLIGHT_PATH).map_err(|err| err.to_string())?;
            let handle = unsafe { libc::dlopen(path.as_ptr(), libc::RTLD_LAZY) };
            if handle.is_null() {
                return Err(format!("dlopen failed for {SKYLIGHT_PATH}"));
            }

            unsafe {
                let main_connection: MainConnectionIdFn =
                    std::mem::transmute(symbol(handle, c"SLSMainConnectionID")?);
                Ok(Self {
                    connection: main_connection(),
                    copy_spaces_for_windows: std::mem::transmute(symbol(
                        handle,
                        c"SLSCopySpacesForWindows",
                    )?),
                    get_active_space: std::mem::transmute(symbol(handle, c"SLSGetActiveSpace")?),
                    copy_managed_display_spaces: std::mem::transmute(symbol(
                        handle,
                        c"SLSCopyManagedDisplaySpaces",
                    )?),
                    set_front_process_with_options: std::mem::transmute(symbol(
                        handle,
                        c"_SLPSSetFrontProcessWithOptions",
                    )?),
                    post_event_record_to: std::mem::transmute(symbol(
                        handle,
                        c"SLPSPostEventRecordTo",
                    )?),
                    get_process_for_pid: std::mem::transmute(symbol(
                        libc::RTLD_DEFAULT,
                        c"GetProcessForPID",
                    )?),
                })
            }
        }

        pub fn connection(&self) -> i32 {
            self.connection
        }

        /// Space ids that contain `window_id`
        pub fn spaces_for_window(&self, window_id: u32) -> Vec<u64> {
            let ids = CFArray::from_CFTypes(&[CFNumber::from(i64::from(window_id))]);
            let raw = unsafe {
                (self.copy_spaces_for_windows)(
                    self.connection,
                    ALL_SPACES_MASK,
                    ids.as_concrete_TypeRef(),
                )
            };
            if raw.is_null() {
                return Vec::new();
            }

            let spaces: CFArray<CFType> = unsafe { CFArray::wrap_under_create_rule(raw) };
            spaces
                .iter()
                .filter_map(|item| item.downcast::<CFNumber>())
                .filter_map(|number| number.to_i64())
                .filter_map(|id| u64::try_from(id).ok())
                .collect()
        }

        pub fn active_space(&self) -> u64 {
            unsafe { (self.get_active_space)(self.connection) }
        }

        pub fn managed_display_spaces(&self) -> Vec<ManagedDisplay> {
            let raw = unsafe { (self.copy_managed_display_spaces)(self.connection) };
            if raw.is_null() {
                return Vec::new();
            }

            let displays: CFArray<CFType> = unsafe { CFArray::wrap_under_create_rule(raw) };
            displays
                .iter()
                .filter_map(|item| dictionary(&item))
                .map(|display| ManagedDisplay {
                    identifier: find(&display, DISPLAY_IDENTIFIER_KEY)
                        .and_then(|v| v.downcast::<CFString>())
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                    current_space: find(&display, CURRENT_SPACE_KEY)
                        .and_then(|v| dictionary(&v))
                        .and_then(|space| space_id(&space))
                        .unwrap_or(0),
                    spaces: find(&display, SPACES_KEY)
                        .and_then(|v| array(&v))
                        .map(|spaces| {
                            spaces
                                .iter()
                                .filter_map(|space| dictionary(&space))
                                .filter_map(|space| space_id(&space))
                                .collect()
                        })
                        .unwrap_or_default(),
                })
                .collect()
        }

        /// Bring `pid` to front, switching to the space holding `window_id`
        pub fn front_process_with_window(&self, pid: i32, window_id: u32) -> i32 {
            let Some(psn) = self.process_serial_number(pid) else {
                return -1;
            };
            unsafe { (self.set_front_process_with_options)(&psn, window_id, USER_GENERATED_FRONT) }
        }

        /// Send one raw event record to the connection owned by `pid`
        pub fn post_event_record(&self, pid: i32, record: &[u8]) -> i32 {
            let Some(psn) = self.process_serial_number(pid) else {
                return -1;
            };
            unsafe { (self.post_event_record_to)(&psn, record.as_ptr()) }
        }

        fn process_serial_number(&self, pid: i32) -> Option<ProcessSerialNumber> {
            let mut psn = ProcessSerialNumber::default();
            let status = unsafe { (self.get_process_for_pid)(pid, &mut psn) };
            (status == 0).then_some(psn)
        }
    }

    unsafe fn symbol(handle: *mut c_void, name: &CStr) -> Result<*mut c_void, String> {
        let pointer = libc::dlsym(handle, name.as_ptr());
        if pointer.is_null() {
            Err(format!("missing symbol {}", name.to_string_lossy()))
        } else {
            Ok(pointer)
        }
    }

    fn os_version() -> Option<(u32, u32)> {
        let mut buffer = [0u8; 32];
        let mut len = buffer.len();
        let status = unsafe {
            libc::sysctlbyname(
                c"kern.osproductversion".as_ptr(),
                buffer.as_mut_ptr() as *mut c_void,
                &mut len,
                std::ptr::null_mut(),
                0,
            )
        };
        if status != 0 {
            return None;
        }
        let raw = CStr::from_bytes_until_nul(&buffer).ok()?.to_str().ok()?;
        parse_os_version(raw)
    }

    fn dictionary(value: &CFType) -> Option<CFDictionary<CFString, CFType>> {
        if !value.instance_of::<CFDictionary>() {
            return None;
        }
        Some(unsafe { CFDictionary::wrap_under_get_rule(value.as_CFTypeRef() as _) })
    }

    fn array(value: &CFType) -> Option<CFArray<CFType>> {
        if !value.instance_of::<CFArray>() {
            return None;
        }
        Some(unsafe { CFArray::wrap_under_get_rule(value.as_CFTypeRef() as CFArrayRef) })
    }

    fn find(dict: &CFDictionary<CFString, CFType>, key: &'static str) -> Option<CFType> {
        let key = CFString::from_static_string(key);
        dict.find(&key).map(|item| (*item).clone())
    }

    fn space_id(space: &CFDictionary<CFString, CFType>) -> Option<u64> {
        find(space, SPACE_ID_KEY)
            .and_then(|v| v.downcast::<CFNumber>())
            .and_then(|n| n.to_i64())
            .and_then(|id| u64::try_from(id).ok())
    }
}

#[cfg(not(target_os = "macos"))]
mod platform {
    use super::ManagedDisplay;

    /// Stand-in that can never be loaded off macOS
    pub struct SkyLight {
        _private: (),
    }

    impl SkyLight {
        pub fn load() -> Result<Self, String> {
            Err("SkyLight is only present on macOS".to_string())
        }

        pub fn connection(&self) -> i32 {
            0
        }

        pub fn spaces_for_window(&self, _window_id: u32) -> Vec<u64> {
            Vec::new()
        }

        pub fn active_space(&self) -> u64 {
            0
        }

        pub fn managed_display_spaces(&self) -> Vec<ManagedDisplay> {
            Vec::new()
        }

        pub fn front_process_with_window(&self, _pid: i32, _window_id: u32) -> i32 {
            -1
        }

        pub fn post_event_record(&self, _pid: i32, _record: &[u8]) -> i32 {
            -1
        }
    }
}
