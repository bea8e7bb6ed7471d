//! Maps system lifecycle events onto cache invalidations

use crate::cache::ttl::TtlCache;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Launch,
    Terminate,
    Hide,
    Unhide,
    Activate,
    DesktopChange,
}

/// One system notification, reduced to what invalidation needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationEvent {
    pub kind: EventKind,
    pub pid: Option<i32>,
    pub bundle_id: Option<String>,
}

impl InvalidationEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            pid: None,
            bundle_id: None,
        }
    }

    pub fn for_app(kind: EventKind, pid: i32, bundle_id: Option<&str>) -> Self {
        Self {
            kind,
            pid: Some(pid),
            bundle_id: bundle_id.map(str::to_string),
        }
    }
}

pub type InvalidationObserver = Arc<dyn Fn(&InvalidationEvent) + Send + Sync>;

/// Applies the tiered invalidation policy, then notifies observers
pub struct EventMonitor {
    cache: Arc<TtlCache>,
    observers: RwLock<Vec<InvalidationObserver>>,
}

impl fmt::Debug for EventMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventMonitor")
            .field(
                "observers",
                &self
                    .observers
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .finish()
    }
}

impl EventMonitor {
    pub fn new(cache: Arc<TtlCache>) -> Self {
        Self {
            cache,
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register a callback invoked after every handled event
    pub fn register_observer<F>(&self, observer: F)
    where
        F: Fn(&InvalidationEvent) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    /// Invalidate for `event` and broadcast it, returning entries removed.
    ///
    /// Launch and terminate drop both the process and bundle scopes.
    /// Visibility and focus changes drop the bundle scope only. A desktop
    /// switch clears everything.
    pub async fn handle(&self, event: &InvalidationEvent) -> usize {
        let removed = match event.kind {
            EventKind::Launch | EventKind::Terminate => {
                let mut removed = 0;
                if let Some(bundle_id) = &event.bundle_id {
                    removed += self.cache.invalidate_bundle(bundle_id).await;
                }
                if let Some(pid) = event.pid {
                    removed += self.cache.invalidate_process(pid).await;
                }
                if event.bundle_id.is_none() && event.pid.is_none() {
                    removed += self.cache.clear().await;
                }
                removed
            }
            EventKind::Hide | EventKind::Unhide | EventKind::Activate => match &event.bundle_id {
                Some(bundle_id) => self.cache.invalidate_bundle(bundle_id).await,
                None => {
                    debug!(kind = ?event.kind, pid = ?event.pid, "No bundle id, nothing to invalidate");
                    0
                }
            },
            EventKind::DesktopChange => self.cache.clear().await,
        };

        debug!(?event, removed, "Handled invalidation event");

        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer(event);
        }

        removed
    }

    /// Drain `events` on a background task until the sender side closes
    pub fn spawn(self: Arc<Self>, mut events: UnboundedReceiver<InvalidationEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Event monitor started");
            while let Some(event) = events.recv().await {
                self.handle(&event).await;
            }
            info!("Event monitor stopped");
        })
    }
}
