//! Workspace notification source.
//!
//! Registers an Objective-C observer on the shared workspace notification
//! center and forwards each lifecycle or desktop-switch notification as one
//! `InvalidationEvent` over a tokio channel. Notifications are delivered on
//! the main thread, so the owner must keep that thread's run loop turning
//! (see [`pump_run_loop`]).

use crate::cache::{EventKind, InvalidationEvent};
use crate::Result;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

pub const LAUNCH_NOTIFICATION: &str = "NSWorkspaceDidLaunchApplicationNotification";
pub const TERMINATE_NOTIFICATION: &str = "NSWorkspaceDidTerminateApplicationNotification";
pub const HIDE_NOTIFICATION: &str = "NSWorkspaceDidHideApplicationNotification";
pub const UNHIDE_NOTIFICATION: &str = "NSWorkspaceDidUnhideApplicationNotification";
pub const ACTIVATE_NOTIFICATION: &str = "NSWorkspaceDidActivateApplicationNotification";
pub const SPACE_CHANGE_NOTIFICATION: &str = "NSWorkspaceActiveSpaceDidChangeNotification";

/// Every notification the observer subscribes to
pub const OBSERVED_NOTIFICATIONS: [&str; 6] = [
    LAUNCH_NOTIFICATION,
    TERMINATE_NOTIFICATION,
    HIDE_NOTIFICATION,
    UNHIDE_NOTIFICATION,
    ACTIVATE_NOTIFICATION,
    SPACE_CHANGE_NOTIFICATION,
];

/// Map a workspace notification name onto its event kind
pub fn kind_for_notification(name: &str) -> Option<EventKind> {
    match name {
        LAUNCH_NOTIFICATION => Some(EventKind::Launch),
        TERMINATE_NOTIFICATION => Some(EventKind::Terminate),
        HIDE_NOTIFICATION => Some(EventKind::Hide),
        UNHIDE_NOTIFICATION => Some(EventKind::Unhide),
        ACTIVATE_NOTIFICATION => Some(EventKind::Activate),
        SPACE_CHANGE_NOTIFICATION => Some(EventKind::DesktopChange),
        _ => None,
    }
}

/// Live registration with the workspace notification center.
///
/// Dropping it unregisters the observer.
pub struct WorkspaceObserver {
    _registration: platform::Registration,
}

impl std::fmt::Debug for WorkspaceObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceObserver").finish_non_exhaustive()
    }
}

impl WorkspaceObserver {
    /// Register the observer, returning it together with the event stream
    pub fn start() -> Result<(Self, UnboundedReceiver<InvalidationEvent>)> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let registration = platform::Registration::register(sender)?;
        tracing::info!(
            notifications = OBSERVED_NOTIFICATIONS.len(),
            "Workspace notification observer registered"
        );
        Ok((
            Self {
                _registration: registration,
            },
            receiver,
        ))
    }
}

/// Run the current thread's run loop for `duration` so notifications fire
pub fn pump_run_loop(duration: Duration) {
    platform::pump_run_loop(duration);
}

#[cfg(target_os = "macos")]
mod platform {
    use super::{kind_for_notification, OBSERVED_NOTIFICATIONS};
    use crate::cache::InvalidationEvent;
    use crate::macos::process::platform::{describe, ns_string};
    use crate::Result;
    use cocoa::base::{id, nil};
    use cocoa::foundation::{NSAutoreleasePool, NSString};
    use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop};
    use objc::declare::ClassDecl;
    use objc::runtime::{Class, Object, Sel};
    use objc::{class, msg_send, sel, sel_impl};
    use std::ffi::c_void;
    use std::sync::Once;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedSender;
    use tracing::{debug, trace};

    const OBSERVER_CLASS: &str = "WinScoutWorkspaceObserver";
    const SENDER_IVAR: &str = "winscoutSender";
    const APPLICATION_KEY: &str = "NSWorkspaceApplicationKey";

    type EventSender = UnboundedSender<InvalidationEvent>;

    pub struct Registration {
        observer: id,
        sender: *mut EventSender,
    }

    // The observer object is only messaged by the notification center and
    // by `Drop`; the sender is itself thread-safe.
    unsafe impl Send for Registration {}
    unsafe impl Sync for Registration {}

    impl Registration {
        pub fn register(sender: EventSender) -> Result<Self> {
            let sender = Box::into_raw(Box::new(sender));
            unsafe {
                let pool = NSAutoreleasePool::new(nil);
                let observer: id = msg_send![observer_class(), new];
                (*observer).set_ivar::<*mut c_void>(SENDER_IVAR, sender as *mut c_void);

                let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
                let center: id = msg_send![workspace, notificationCenter];
                for name in OBSERVED_NOTIFICATIONS {
                    let name = NSString::alloc(nil).init_str(name).autorelease();
                    let _: () = msg_send![
                        center,
                        addObserver: observer
                        selector: sel!(handleNotification:)
                        name: name
                        object: nil
                    ];
                }
                let _: () = msg_send![pool, drain];

                Ok(Self { observer, sender })
            }
        }
    }

    impl Drop for Registration {
        fn drop(&mut self) {
            unsafe {
                let workspace: id = msg_send![class!(NSWorkspace), sharedWorkspace];
                let center: id = msg_send![workspace, notificationCenter];
                let _: () = msg_send![center, removeObserver: self.observer];
                let _: () = msg_send![self.observer, release];
                drop(Box::from_raw(self.sender));
            }
            debug!("Workspace notification observer removed");
        }
    }

    fn observer_class() -> &'static Class {
        static REGISTER: Once = Once::new();
        REGISTER.call_once(|| {
            let Some(mut decl) = ClassDecl::new(OBSERVER_CLASS, class!(NSObject)) else {
                return;
            };
            decl.add_ivar::<*mut c_void>(SENDER_IVAR);
            unsafe {
                decl.add_method(
                    sel!(handleNotification:),
                    handle_notification as extern "C" fn(&Object, Sel, id),
                );
            }
            decl.register();
        });
        Class::get(OBSERVER_CLASS).expect("workspace observer class registered")
    }

    extern "C" fn handle_notification(this: &Object, _cmd: Sel, notification: id) {
        unsafe {
            let sender = *this.get_ivar::<*mut c_void>(SENDER_IVAR) as *const EventSender;
            if sender.is_null() {
                return;
            }

            let name: id = msg_send![notification, name];
            let Some(name) = ns_string(name) else {
                return;
            };
            let Some(kind) = kind_for_notification(&name) else {
                return;
            };

            let mut event = InvalidationEvent::new(kind);
            let user_info: id = msg_send![notification, userInfo];
            if user_info != nil {
                let key = NSString::alloc(nil).init_str(APPLICATION_KEY).autorelease();
                let app: id = msg_send![user_info, objectForKey: key];
                if app != nil {
                    let info = describe(app);
                    event.pid = Some(info.pid);
                    event.bundle_id = info.bundle_id;
                }
            }

            trace!(?event, "Workspace notification");
            let _ = (*sender).send(event);
        }
    }

    pub fn pump_run_loop(duration: Duration) {
        let _ = CFRunLoop::run_in_mode(unsafe { kCFRunLoopDefaultMode }, duration, false);
    }
}

#[cfg(not(target_os = "macos"))]
mod platform {
    use crate::cache::InvalidationEvent;
    use crate::{Result, ScoutError};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedSender;

    pub struct Registration;

    impl Registration {
        pub fn register(_sender: UnboundedSender<InvalidationEvent>) -> Result<Self> {
            Err(ScoutError::ProviderFailure(
                "workspace notifications are only available on macOS".into(),
            )
            .into())
        }
    }

    pub fn pump_run_loop(duration: Duration) {
        std::thread::sleep(duration);
    }
}
