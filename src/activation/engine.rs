//! Three-strategy window activation

use crate::activation::protocol::MakeKeyCommand;
use crate::macos::accessibility::{ElementCache, ElementHandle};
use crate::macos::core_graphics::WindowListProvider;
use crate::macos::objc_bridge::RunLoopHandle;
use crate::macos::window_server::WindowServer;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Maps a window id to its owning process
pub trait ProcessIdResolver: Send + Sync {
    fn resolve_process_id(&self, window_id: u32) -> Option<i32>;
}

/// Supplies the accessibility element of one exact window
pub trait ElementResolver: Send + Sync {
    fn resolve_element(&self, pid: i32, window_id: u32) -> Option<ElementHandle>;
}

impl ElementResolver for ElementCache {
    fn resolve_element(&self, pid: i32, window_id: u32) -> Option<ElementHandle> {
        self.get(window_id).filter(|element| element.pid() == pid)
    }
}

/// Resolves owners by scanning the window server's list
pub struct WindowListResolver {
    window_list: Arc<dyn WindowListProvider>,
}

impl WindowListResolver {
    pub fn new(window_list: Arc<dyn WindowListProvider>) -> Self {
        Self { window_list }
    }
}

impl ProcessIdResolver for WindowListResolver {
    fn resolve_process_id(&self, window_id: u32) -> Option<i32> {
        match self.window_list.owner_of(window_id) {
            Ok(owner) => owner,
            Err(err) => {
                warn!(window_id, error = %err, "Window list scan failed");
                None
            }
        }
    }
}

/// Optional collaborators supplied per activation call
#[derive(Clone, Default)]
pub struct ActivationDependencies {
    pub process_resolver: Option<Arc<dyn ProcessIdResolver>>,
    pub element_resolver: Option<Arc<dyn ElementResolver>>,
}

impl std::fmt::Debug for ActivationDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationDependencies")
            .field("process_resolver", &self.process_resolver.is_some())
            .field("element_resolver", &self.element_resolver.is_some())
            .finish()
    }
}

/// What one activation actually did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub window_id: u32,
    pub pid: Option<i32>,
    pub front_status: Option<i32>,
    pub make_key_statuses: Vec<i32>,
    pub raised: bool,
}

/// Runs the activation strategies in order; none of them can cancel a later one
pub struct ActivationEngine {
    server: Arc<dyn WindowServer>,
    fallback_resolver: Arc<dyn ProcessIdResolver>,
    ui: Arc<RunLoopHandle>,
}

impl std::fmt::Debug for ActivationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationEngine").finish_non_exhaustive()
    }
}

impl ActivationEngine {
    pub fn new(
        server: Arc<dyn WindowServer>,
        fallback_resolver: Arc<dyn ProcessIdResolver>,
        ui: Arc<RunLoopHandle>,
    ) -> Self {
        Self {
            server,
            fallback_resolver,
            ui,
        }
    }

    #[instrument(skip(self, dependencies))]
    pub async fn activate(
        &self,
        window_id: u32,
        pid: Option<i32>,
        dependencies: ActivationDependencies,
    ) -> ActivationReport {
        let mut report = ActivationReport {
            window_id,
            ..ActivationReport::default()
        };

        let resolved = pid.or_else(|| {
            dependencies
                .process_resolver
                .as_ref()
                .unwrap_or(&self.fallback_resolver)
                .resolve_process_id(window_id)
        });
        let Some(pid) = resolved else {
            warn!(window_id, "No owning process for window, activation abandoned");
            return report;
        };
        report.pid = Some(pid);

        let front = self.server.front_process_with_window(pid, window_id);
        if front != 0 {
            debug!(pid, window_id, status = front, "Front switch returned non-zero");
        }
        report.front_status = Some(front);

        for record in MakeKeyCommand::new(window_id).sequence() {
            let status = self.server.post_event_record(pid, &record);
            if status != 0 {
                debug!(pid, window_id, status, "Make-key record returned non-zero");
            }
            report.make_key_statuses.push(status);
        }

        report.raised = self
            .raise_exact(pid, window_id, dependencies.element_resolver)
            .await;

        info!(
            window_id,
            pid,
            front = report.front_status,
            raised = report.raised,
            "Activation dispatched"
        );
        report
    }

    /// Raise only the element of this exact window, never a guess
    async fn raise_exact(
        &self,
        pid: i32,
        window_id: u32,
        resolver: Option<Arc<dyn ElementResolver>>,
    ) -> bool {
        let Some(resolver) = resolver else {
            return false;
        };

        let outcome = self
            .ui
            .run(move || {
                let element = resolver.resolve_element(pid, window_id)?;
                Some(element.raise())
            })
            .await;

        match outcome {
            Ok(Some(Ok(()))) => true,
            Ok(Some(Err(err))) => {
                debug!(window_id, error = %err, "Accessibility raise failed");
                false
            }
            Ok(None) => {
                debug!(window_id, "No cached element for window, skipping raise");
                false
            }
            Err(err) => {
                warn!(window_id, error = %err, "Run loop unavailable for raise");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::protocol::{PHASE_OFFSET, RECORD_LEN, WINDOW_ID_OFFSET};
    use crate::macos::accessibility::{
        AccessibilityProvider, AccessibilityWindowInfo, InMemoryAccessibilityProvider,
    };
    use crate::macos::core_graphics::{InMemoryWindowList, RawWindow};
    use crate::macos::objc_bridge::spawn_run_loop;
    use crate::macos::window_server::MockWindowServer;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::sync::Mutex;
    use std::time::Duration;

    fn ui() -> Arc<RunLoopHandle> {
        Arc::new(spawn_run_loop("activation-test-ui").unwrap())
    }

    fn empty_resolver() -> Arc<dyn ProcessIdResolver> {
        Arc::new(WindowListResolver::new(Arc::new(InMemoryWindowList::default())))
    }

    fn recording_server(window_id: u32, pid: i32) -> (MockWindowServer, Arc<Mutex<Vec<Vec<u8>>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut server = MockWindowServer::new();
        let mut sequence = Sequence::new();

        server
            .expect_front_process_with_window()
            .with(eq(pid), eq(window_id))
            .times(1)
            .in_sequence(&mut sequence)
            .return_const(0);

        let log = sent.clone();
        server
            .expect_post_event_record()
            .withf(move |target, _| *target == pid)
            .times(2)
            .in_sequence(&mut sequence)
            .returning(move |_, record| {
                log.lock().unwrap().push(record.to_vec());
                0
            });

        (server, sent)
    }

    #[tokio::test]
    async fn wire_traffic_is_one_front_call_and_two_records() {
        let (server, sent) = recording_server(4242, 99);
        let engine = ActivationEngine::new(Arc::new(server), empty_resolver(), ui());

        let report = engine
            .activate(4242, Some(99), ActivationDependencies::default())
            .await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        for record in sent.iter() {
            assert_eq!(record.len(), RECORD_LEN);
            assert_eq!(
                &record[WINDOW_ID_OFFSET..WINDOW_ID_OFFSET + 4],
                &4242u32.to_le_bytes()
            );
        }
        let differing: Vec<usize> = (0..RECORD_LEN)
            .filter(|i| sent[0][*i] != sent[1][*i])
            .collect();
        assert_eq!(differing, vec![PHASE_OFFSET]);
        assert_eq!(report.make_key_statuses, vec![0, 0]);
        assert!(!report.raised);
    }

    #[tokio::test]
    async fn element_cache_miss_never_raises_another_window() {
        let (server, _) = recording_server(7, 10);
        let provider = InMemoryAccessibilityProvider::new_with(vec![(
            10,
            vec![AccessibilityWindowInfo::new(5), AccessibilityWindowInfo::new(6)],
        )]);
        let cache = Arc::new(ElementCache::new());
        cache.insert_all(
            provider
                .windows_for_process(10, Duration::from_millis(20))
                .unwrap()
                .elements,
        );

        let engine = ActivationEngine::new(Arc::new(server), empty_resolver(), ui());
        let dependencies = ActivationDependencies {
            process_resolver: None,
            element_resolver: Some(cache),
        };
        let report = engine.activate(7, Some(10), dependencies).await;

        assert!(!report.raised);
        assert_eq!(provider.total_raises(), 0);
    }

    #[tokio::test]
    async fn exact_element_is_raised() {
        let (server, _) = recording_server(6, 10);
        let provider = InMemoryAccessibilityProvider::new_with(vec![(
            10,
            vec![AccessibilityWindowInfo::new(5), AccessibilityWindowInfo::new(6)],
        )]);
        let cache = Arc::new(ElementCache::new());
        cache.insert_all(
            provider
                .windows_for_process(10, Duration::from_millis(20))
                .unwrap()
                .elements,
        );

        let engine = ActivationEngine::new(Arc::new(server), empty_resolver(), ui());
        let dependencies = ActivationDependencies {
            process_resolver: None,
            element_resolver: Some(cache),
        };
        let report = engine.activate(6, Some(10), dependencies).await;

        assert!(report.raised);
        assert_eq!(provider.raise_count(6), 1);
        assert_eq!(provider.raise_count(5), 0);
    }

    #[tokio::test]
    async fn unresolved_process_aborts_silently() {
        let mut server = MockWindowServer::new();
        server.expect_front_process_with_window().never();
        server.expect_post_event_record().never();
        let engine = ActivationEngine::new(Arc::new(server), empty_resolver(), ui());

        let report = engine
            .activate(1, None, ActivationDependencies::default())
            .await;

        assert_eq!(report.pid, None);
        assert!(report.make_key_statuses.is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_window_list_scan() {
        let (server, _) = recording_server(31, 3);
        let list = InMemoryWindowList::new_with(vec![RawWindow {
            window_id: 31,
            owner_pid: 3,
            ..RawWindow::default()
        }]);
        let resolver: Arc<dyn ProcessIdResolver> =
            Arc::new(WindowListResolver::new(Arc::new(list)));
        let engine = ActivationEngine::new(Arc::new(server), resolver, ui());

        let report = engine
            .activate(31, None, ActivationDependencies::default())
            .await;
        assert_eq!(report.pid, Some(3));
    }

    #[tokio::test]
    async fn failing_strategy_does_not_stop_the_next() {
        let mut server = MockWindowServer::new();
        server
            .expect_front_process_with_window()
            .times(1)
            .return_const(-1);
        server.expect_post_event_record().times(2).return_const(-1);
        let engine = ActivationEngine::new(Arc::new(server), empty_resolver(), ui());

        let report = engine
            .activate(8, Some(8), ActivationDependencies::default())
            .await;
        assert_eq!(report.front_status, Some(-1));
        assert_eq!(report.make_key_statuses, vec![-1, -1]);
    }
}
