//! Integration tests for WinScout
//!
//! Every test drives the public API over the in-memory providers, so the
//! suite runs the same on any host.

use std::sync::{Arc, Mutex};
use winscout::config::ScoutConfig;
use winscout::discovery::{DiscoveryEngine, DiscoveryOptions, DiscoverySources, EngineSettings};
use winscout::macos::{
    spawn_run_loop, AccessibilityWindowInfo, AppInfo, Bounds, DisplaySpaceInfo, ElementCache,
    InMemoryAccessibilityProvider, InMemoryProcessRegistry, InMemorySpaceProvider,
    InMemoryWindowList, RawWindow, WindowServer, STANDARD_WINDOW_SUBROLE,
};
use winscout::WindowService;

fn raw(window_id: u32, pid: i32, title: Option<&str>, width: f64, height: f64) -> RawWindow {
    RawWindow {
        window_id,
        owner_pid: pid,
        owner_name: Some(format!("App {pid}")),
        title: title.map(str::to_string),
        bounds: Some(Bounds::new(100.0, 100.0, width, height).unwrap()),
        alpha: Some(1.0),
        layer: Some(0),
        is_on_screen: true,
    }
}

fn standard(window_id: u32, title: &str) -> AccessibilityWindowInfo {
    AccessibilityWindowInfo {
        title: Some(title.to_string()),
        subrole: Some(STANDARD_WINDOW_SUBROLE.to_string()),
        ..AccessibilityWindowInfo::new(window_id)
    }
}

fn display() -> DisplaySpaceInfo {
    DisplaySpaceInfo {
        display_id: 1,
        uuid: uuid::Uuid::parse_str("37D8832A-2D66-02CA-B9F7-8F30A301B230").ok(),
        current_space: 1,
        spaces: vec![1, 2],
        bounds: Bounds::new(0.0, 0.0, 2560.0, 1440.0).unwrap(),
        is_primary: true,
    }
}

/// Window server double that records every call it receives
#[derive(Default)]
struct RecordingServer {
    fronts: Mutex<Vec<(i32, u32)>>,
    records: Mutex<Vec<Vec<u8>>>,
}

impl WindowServer for RecordingServer {
    fn front_process_with_window(&self, pid: i32, window_id: u32) -> i32 {
        self.fronts.lock().unwrap().push((pid, window_id));
        0
    }

    fn post_event_record(&self, _pid: i32, record: &[u8]) -> i32 {
        self.records.lock().unwrap().push(record.to_vec());
        0
    }
}

mod discovery_pipeline {
    use super::*;

    /// A: large standard window on the active desktop. B: below minimum
    /// size. C: no subrole, large, on an inactive desktop.
    fn scenario() -> DiscoverySources {
        DiscoverySources {
            window_list: Arc::new(InMemoryWindowList::new_with(vec![
                raw(30, 300, Some("Charlie"), 900.0, 600.0),
                raw(10, 100, Some("Alpha"), 1200.0, 800.0),
                raw(20, 100, Some("Bravo"), 50.0, 50.0),
            ])),
            accessibility: Arc::new(InMemoryAccessibilityProvider::new_with(vec![(
                100,
                vec![standard(10, "Alpha")],
            )])),
            processes: Arc::new(InMemoryProcessRegistry::new_with(vec![
                AppInfo::new(100, "Editor", Some("com.example.Editor")),
                AppInfo::new(300, "Viewer", Some("com.example.Viewer")),
            ])),
            spaces: Arc::new(InMemorySpaceProvider::new_with(
                vec![display()],
                vec![(10, vec![1]), (20, vec![1]), (30, vec![2])],
            )),
        }
    }

    fn engine(sources: DiscoverySources) -> DiscoveryEngine {
        DiscoveryEngine::new(
            sources,
            Arc::new(spawn_run_loop("integration-ui").unwrap()),
            Arc::new(ElementCache::new()),
            EngineSettings::default(),
        )
    }

    #[tokio::test]
    async fn default_options_keep_standard_and_large_subroleless_windows() {
        let windows = engine(scenario())
            .discover(&DiscoveryOptions::default())
            .await
            .unwrap();

        let ids: Vec<u32> = windows.iter().map(|w| w.window_id).collect();
        assert_eq!(ids, vec![10, 30]);

        let charlie = &windows[1];
        assert_eq!(charlie.title, "Charlie");
        assert_eq!(charlie.desktop_number, Some(2));
        assert_eq!(charlie.display_id, Some(1));
        assert_eq!(charlie.bundle_id.as_deref(), Some("com.example.Viewer"));
        assert!(!charlie.is_on_all_spaces);
    }

    #[tokio::test]
    async fn active_desktop_only_drops_the_inactive_window() {
        let windows = engine(scenario())
            .discover(&DiscoveryOptions::active_desktop_only())
            .await
            .unwrap();

        let ids: Vec<u32> = windows.iter().map(|w| w.window_id).collect();
        assert_eq!(ids, vec![10]);
    }

    #[tokio::test]
    async fn active_desktop_only_rejects_windows_without_membership() {
        let sources = DiscoverySources {
            window_list: Arc::new(InMemoryWindowList::new_with(vec![
                raw(1, 100, Some("Placed"), 1200.0, 800.0),
                raw(2, 100, Some("Unplaced"), 1200.0, 800.0),
            ])),
            accessibility: Arc::new(InMemoryAccessibilityProvider::new_with(vec![(
                100,
                vec![standard(1, "Placed"), standard(2, "Unplaced")],
            )])),
            processes: Arc::new(InMemoryProcessRegistry::default()),
            spaces: Arc::new(InMemorySpaceProvider::new_with(
                vec![display()],
                vec![(1, vec![1])],
            )),
        };

        let windows = engine(sources)
            .discover(&DiscoveryOptions::active_desktop_only())
            .await
            .unwrap();

        let ids: Vec<u32> = windows.iter().map(|w| w.window_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn subrole_heuristic_depends_on_size() {
        let sources = DiscoverySources {
            window_list: Arc::new(InMemoryWindowList::new_with(vec![
                raw(1, 100, Some("Large"), 900.0, 600.0),
                raw(2, 200, Some("Small"), 400.0, 300.0),
            ])),
            accessibility: Arc::new(InMemoryAccessibilityProvider::new_with(vec![])),
            processes: Arc::new(InMemoryProcessRegistry::default()),
            spaces: Arc::new(InMemorySpaceProvider::new_with(
                vec![display()],
                vec![(1, vec![1]), (2, vec![1])],
            )),
        };

        let windows = engine(sources)
            .discover(&DiscoveryOptions::default())
            .await
            .unwrap();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].window_id, 1);
    }

    #[tokio::test]
    async fn titles_fall_back_to_raw_then_cache_then_empty() {
        let list = Arc::new(InMemoryWindowList::new_with(vec![
            raw(1, 100, Some("Raw title"), 800.0, 600.0),
            raw(2, 100, Some("Draft"), 800.0, 600.0),
            raw(3, 100, None, 800.0, 600.0),
        ]));
        let sources = DiscoverySources {
            window_list: list.clone(),
            accessibility: Arc::new(InMemoryAccessibilityProvider::new_with(vec![(
                100,
                vec![standard(1, "Accessibility title")],
            )])),
            processes: Arc::new(InMemoryProcessRegistry::default()),
            spaces: Arc::new(InMemorySpaceProvider::unavailable()),
        };
        let engine = engine(sources);
        let options = DiscoveryOptions {
            require_standard_subrole: false,
            ..DiscoveryOptions::default()
        };

        engine.discover(&options).await.unwrap();
        list.replace(vec![
            raw(1, 100, Some("Raw title"), 800.0, 600.0),
            raw(2, 100, None, 800.0, 600.0),
            raw(3, 100, None, 800.0, 600.0),
        ]);
        let windows = engine.discover(&options).await.unwrap();

        let title_of = |id: u32| {
            windows
                .iter()
                .find(|w| w.window_id == id)
                .map(|w| w.title.clone())
                .unwrap()
        };
        assert_eq!(title_of(1), "Accessibility title");
        assert_eq!(title_of(2), "Draft");
        assert_eq!(title_of(3), "");
    }

    #[tokio::test]
    async fn process_query_runs_the_full_pipeline() {
        let windows = engine(scenario())
            .discover_for_process(300, &DiscoveryOptions::default())
            .await
            .unwrap();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].window_id, 30);
    }
}

mod post_processing {
    use super::*;
    use chrono::Utc;
    use winscout::discovery::drop_auxiliary_windows;
    use winscout::WindowSnapshot;

    fn snapshot(window_id: u32, pid: i32, subrole: Option<&str>, spaces: Vec<u64>) -> WindowSnapshot {
        WindowSnapshot {
            window_id,
            title: format!("Window {window_id}"),
            bounds: Bounds::new(0.0, 0.0, 640.0, 480.0).unwrap(),
            alpha: 1.0,
            is_on_screen: true,
            layer: 0,
            pid,
            bundle_id: None,
            app_name: format!("App {pid}"),
            is_minimized: false,
            is_hidden: false,
            is_fullscreen: false,
            is_focused: false,
            is_main: false,
            is_tabbed: false,
            space_ids: spaces,
            is_on_all_spaces: false,
            desktop_number: None,
            display_id: None,
            role: None,
            subrole: subrole.map(str::to_string),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn auxiliary_window_is_dropped_next_to_a_standard_one() {
        let kept = drop_auxiliary_windows(vec![
            snapshot(1, 10, Some(STANDARD_WINDOW_SUBROLE), vec![1]),
            snapshot(2, 10, None, vec![]),
        ]);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].window_id, 1);
    }

    #[test]
    fn process_without_standard_windows_keeps_everything() {
        let kept = drop_auxiliary_windows(vec![snapshot(1, 20, None, vec![]), snapshot(2, 20, None, vec![])]);
        assert_eq!(kept.len(), 2);
    }
}

mod service {
    use super::*;
    use winscout::activation::{ActivationDependencies, ElementResolver, ProcessIdResolver};
    use winscout::cache::{EventKind, InvalidationEvent};
    use winscout::macos::ElementHandle;

    struct FixedResolver(i32);

    impl ProcessIdResolver for FixedResolver {
        fn resolve_process_id(&self, _window_id: u32) -> Option<i32> {
            Some(self.0)
        }
    }

    struct NoElements;

    impl ElementResolver for NoElements {
        fn resolve_element(&self, _pid: i32, _window_id: u32) -> Option<ElementHandle> {
            None
        }
    }

    struct Fixture {
        list: Arc<InMemoryWindowList>,
        accessibility: Arc<InMemoryAccessibilityProvider>,
        server: Arc<RecordingServer>,
        service: WindowService,
    }

    fn fixture() -> Fixture {
        let list = Arc::new(InMemoryWindowList::new_with(vec![
            raw(1, 10, Some("Inbox"), 1000.0, 700.0),
            raw(2, 20, Some("Shell"), 1000.0, 700.0),
        ]));
        let accessibility = Arc::new(InMemoryAccessibilityProvider::new_with(vec![
            (10, vec![standard(1, "Inbox")]),
            (20, vec![standard(2, "Shell")]),
        ]));
        let server = Arc::new(RecordingServer::default());
        let sources = DiscoverySources {
            window_list: list.clone(),
            accessibility: accessibility.clone(),
            processes: Arc::new(InMemoryProcessRegistry::new_with(vec![
                AppInfo::new(10, "Mail", Some("com.example.Mail")),
                AppInfo::new(20, "Shell", Some("com.example.Shell")),
            ])),
            spaces: Arc::new(InMemorySpaceProvider::unavailable()),
        };
        let service =
            WindowService::with_sources(sources, server.clone(), &ScoutConfig::default()).unwrap();

        Fixture {
            list,
            accessibility,
            server,
            service,
        }
    }

    #[tokio::test]
    async fn desktop_change_event_forces_rediscovery() {
        let fx = fixture();
        let options = DiscoveryOptions::default();

        assert_eq!(fx.service.discover_windows(&options).await.unwrap().len(), 2);
        fx.list.replace(vec![raw(2, 20, Some("Shell"), 1000.0, 700.0)]);
        assert_eq!(fx.service.discover_windows(&options).await.unwrap().len(), 2);

        fx.service
            .handle_event(&InvalidationEvent::new(EventKind::DesktopChange))
            .await;
        assert_eq!(fx.service.discover_windows(&options).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bundle_invalidation_cascades_to_process_queries() {
        let fx = fixture();
        let options = DiscoveryOptions::default();

        fx.service.discover_for_process(10, &options).await.unwrap();
        fx.service.discover_for_bundle("com.example.Shell", &options).await.unwrap();
        assert_eq!(fx.service.statistics().await.entries, 2);

        let removed = fx.service.invalidate_bundle("com.example.Mail").await;
        assert_eq!(removed, 1);
        assert_eq!(fx.service.statistics().await.entries, 1);
    }

    #[tokio::test]
    async fn observers_see_every_event() {
        let fx = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        fx.service
            .register_observer(move |event| sink.lock().unwrap().push(event.kind));

        fx.service
            .handle_event(&InvalidationEvent::for_app(EventKind::Hide, 10, Some("com.example.Mail")))
            .await;
        fx.service
            .handle_event(&InvalidationEvent::for_app(EventKind::Launch, 30, None))
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Hide, EventKind::Launch]);
    }

    #[tokio::test]
    async fn activation_with_resolvers_sends_two_records_and_never_guesses() {
        let fx = fixture();
        fx.service
            .discover_windows(&DiscoveryOptions::default())
            .await
            .unwrap();

        let dependencies = ActivationDependencies {
            process_resolver: Some(Arc::new(FixedResolver(10))),
            element_resolver: Some(Arc::new(NoElements)),
        };
        let report = fx.service.activate_with(1, dependencies).unwrap().await.unwrap();

        assert_eq!(report.pid, Some(10));
        assert!(!report.raised);
        assert_eq!(*fx.server.fronts.lock().unwrap(), vec![(10, 1)]);
        let records = fx.server.records.lock().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record.len() == 248));
        assert_eq!(&records[0][0x3C..0x40], &1u32.to_le_bytes());
        assert_eq!(fx.accessibility.total_raises(), 0);
    }

    #[tokio::test]
    async fn unknown_window_is_abandoned_without_wire_traffic() {
        let fx = fixture();
        let report = fx.service.activate(999, None).unwrap().await.unwrap();

        assert_eq!(report.pid, None);
        assert!(fx.server.fronts.lock().unwrap().is_empty());
        assert!(fx.server.records.lock().unwrap().is_empty());
    }
}
