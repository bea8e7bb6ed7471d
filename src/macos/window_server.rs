//! Raw window-server calls used by activation

use crate::macos::skylight::Availability;

/// Status returned when the private API is not loaded
pub const UNAVAILABLE_STATUS: i32 = -1;

/// The two undocumented calls the activation strategies drive.
///
/// Both return the raw status code; zero means success.
#[cfg_attr(test, mockall::automock)]
pub trait WindowServer: Send + Sync {
    /// Bring `pid` to front, switching desktops to reach `window_id`
    fn front_process_with_window(&self, pid: i32, window_id: u32) -> i32;

    /// Post one event record to the connection owned by `pid`
    fn post_event_record(&self, pid: i32, record: &[u8]) -> i32;
}

/// Window server backed by the probed SkyLight entry points
#[derive(Debug, Clone)]
pub struct SystemWindowServer {
    skylight: Availability,
}

impl SystemWindowServer {
    pub fn new(skylight: Availability) -> Self {
        Self { skylight }
    }

    pub fn is_available(&self) -> bool {
        self.skylight.is_available()
    }
}

impl WindowServer for SystemWindowServer {
    fn front_process_with_window(&self, pid: i32, window_id: u32) -> i32 {
        match self.skylight.get() {
            Some(skylight) => skylight.front_process_with_window(pid, window_id),
            None => UNAVAILABLE_STATUS,
        }
    }

    fn post_event_record(&self, pid: i32, record: &[u8]) -> i32 {
        match self.skylight.get() {
            Some(skylight) => skylight.post_event_record(pid, record),
            None => UNAVAILABLE_STATUS,
        }
    }
}
