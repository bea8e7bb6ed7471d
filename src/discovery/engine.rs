//! Six-stage discovery pipeline

use crate::discovery::builder::InfoBuilder;
use crate::discovery::filter::{FilterInput, FilterPolicy};
use crate::discovery::options::DiscoveryOptions;
use crate::discovery::snapshot::WindowSnapshot;
use crate::discovery::title_cache::{TitleCache, DEFAULT_TITLE_CACHE_CAPACITY};
use crate::discovery::validator::{validate, CheckedWindow};
use crate::macos::accessibility::{
    AccessibilityProvider, AccessibilityWindowInfo, ElementCache, PermissionStatus,
};
use crate::macos::core_graphics::WindowListProvider;
use crate::macos::objc_bridge::RunLoopHandle;
use crate::macos::process::{AppInfo, ProcessRegistry};
use crate::macos::spaces::{DisplaySpaceInfo, SpaceProvider};
use crate::{trace_performance, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

pub const DEFAULT_AX_BUDGET: Duration = Duration::from_millis(50);

/// The four data sources discovery fuses
#[derive(Clone)]
pub struct DiscoverySources {
    pub window_list: Arc<dyn WindowListProvider>,
    pub accessibility: Arc<dyn AccessibilityProvider>,
    pub processes: Arc<dyn ProcessRegistry>,
    pub spaces: Arc<dyn SpaceProvider>,
}

/// Tunables that are not part of the per-call options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Per-process accessibility enumeration budget
    pub ax_budget: Duration,
    pub title_cache_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ax_budget: DEFAULT_AX_BUDGET,
            title_cache_capacity: DEFAULT_TITLE_CACHE_CAPACITY,
        }
    }
}

/// Everything the enrichment stages produced for one pass
#[derive(Debug, Default, Clone)]
pub struct PassInputs {
    pub windows: Vec<CheckedWindow>,
    pub apps: HashMap<i32, AppInfo>,
    pub accessibility: HashMap<u32, AccessibilityWindowInfo>,
    pub window_spaces: HashMap<u32, Vec<u64>>,
    pub active_spaces: Vec<u64>,
    pub displays: Vec<DisplaySpaceInfo>,
}

/// Filter, build, post-process and sort one pass.
///
/// Runs only after every enrichment source has resolved.
pub fn assemble(
    inputs: &PassInputs,
    options: &DiscoveryOptions,
    titles: &mut TitleCache,
    captured_at: DateTime<Utc>,
) -> Vec<WindowSnapshot> {
    let policy = FilterPolicy::new(options, inputs.active_spaces.clone());
    let builder = InfoBuilder::new(
        &inputs.displays,
        captured_at,
        options.enable_cross_space_caching,
    );

    let mut snapshots = Vec::with_capacity(inputs.windows.len());
    for window in &inputs.windows {
        let input = FilterInput {
            window,
            accessibility: inputs.accessibility.get(&window.window_id),
            app: inputs.apps.get(&window.owner_pid),
            space_ids: inputs
                .window_spaces
                .get(&window.window_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        };

        match policy.evaluate(&input) {
            Ok(()) => snapshots.push(builder.build(&input, titles)),
            Err(reason) => trace!(window_id = window.window_id, %reason, "Window filtered"),
        }
    }

    if options.require_standard_subrole {
        snapshots = drop_auxiliary_windows(snapshots);
    }
    sort_snapshots(&mut snapshots);
    snapshots
}

/// Drop subrole-less, desktop-less windows from processes that do expose a
/// standard window. Processes without any standard window keep everything.
pub fn drop_auxiliary_windows(snapshots: Vec<WindowSnapshot>) -> Vec<WindowSnapshot> {
    let with_standard: HashSet<i32> = snapshots
        .iter()
        .filter(|snapshot| snapshot.has_standard_subrole())
        .map(|snapshot| snapshot.pid)
        .collect();

    let before = snapshots.len();
    let kept: Vec<WindowSnapshot> = snapshots
        .into_iter()
        .filter(|snapshot| {
            !with_standard.contains(&snapshot.pid)
                || snapshot.has_standard_subrole()
                || snapshot.has_real_desktop()
        })
        .collect();

    if kept.len() != before {
        debug!(dropped = before - kept.len(), "Removed auxiliary windows");
    }
    kept
}

/// Owning process, then title, then window id
pub fn sort_snapshots(snapshots: &mut [WindowSnapshot]) {
    snapshots.sort_by(|a, b| {
        a.pid
            .cmp(&b.pid)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.window_id.cmp(&b.window_id))
    });
}

/// Orchestrates capture, validation, enrichment and assembly
pub struct DiscoveryEngine {
    sources: DiscoverySources,
    ui: Arc<RunLoopHandle>,
    titles: Mutex<TitleCache>,
    elements: Arc<ElementCache>,
    ax_budget: Duration,
}

impl std::fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("ax_budget", &self.ax_budget)
            .field("elements", &self.elements)
            .finish_non_exhaustive()
    }
}

impl DiscoveryEngine {
    pub fn new(
        sources: DiscoverySources,
        ui: Arc<RunLoopHandle>,
        elements: Arc<ElementCache>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            sources,
            ui,
            titles: Mutex::new(TitleCache::new(settings.title_cache_capacity)),
            elements,
            ax_budget: settings.ax_budget,
        }
    }

    pub fn sources(&self) -> &DiscoverySources {
        &self.sources
    }

    /// Run the full pipeline once.
    ///
    /// Only a failing raw capture is an error; missing permissions or a
    /// missing private API degrade to less enrichment. Dropping the future
    /// between stages abandons the pass.
    #[instrument(skip_all)]
    pub async fn discover(&self, options: &DiscoveryOptions) -> Result<Vec<WindowSnapshot>> {
        let started = std::time::Instant::now();

        let raw = self.sources.window_list.capture()?;
        let raw_count = raw.len();
        tokio::task::yield_now().await;

        let windows: Vec<CheckedWindow> = raw
            .into_iter()
            .filter_map(|record| {
                let window_id = record.window_id;
                validate(record)
                    .map_err(|reason| trace!(window_id, %reason, "Window rejected"))
                    .ok()
            })
            .collect();
        debug!(raw = raw_count, valid = windows.len(), "Captured window list");
        tokio::task::yield_now().await;

        let pids: BTreeSet<i32> = windows.iter().map(|window| window.owner_pid).collect();
        let apps = self.lookup_processes(&pids).await?;
        tokio::task::yield_now().await;

        let accessibility = self.enrich(options, &pids).await?;
        tokio::task::yield_now().await;

        let mut inputs = PassInputs {
            windows,
            apps,
            accessibility,
            ..PassInputs::default()
        };
        self.attach_desktops(options, &mut inputs);
        tokio::task::yield_now().await;

        let snapshots = trace_performance!("discovery_assemble", {
            let mut titles = self.titles.lock().unwrap_or_else(PoisonError::into_inner);
            assemble(&inputs, options, &mut titles, Utc::now())
        });

        debug!(
            returned = snapshots.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Discovery pass complete"
        );
        Ok(snapshots)
    }

    /// Full pipeline, then keep windows owned by `pid`
    pub async fn discover_for_process(
        &self,
        pid: i32,
        options: &DiscoveryOptions,
    ) -> Result<Vec<WindowSnapshot>> {
        let mut snapshots = self.discover(options).await?;
        snapshots.retain(|snapshot| snapshot.pid == pid);
        Ok(snapshots)
    }

    /// Full pipeline, then keep windows owned by `bundle_id`
    pub async fn discover_for_bundle(
        &self,
        bundle_id: &str,
        options: &DiscoveryOptions,
    ) -> Result<Vec<WindowSnapshot>> {
        let mut snapshots = self.discover(options).await?;
        snapshots.retain(|snapshot| snapshot.bundle_id.as_deref() == Some(bundle_id));
        Ok(snapshots)
    }

    /// Process ids of every running instance of `bundle_id`
    pub async fn running_pids_for_bundle(&self, bundle_id: &str) -> Result<Vec<i32>> {
        let processes = Arc::clone(&self.sources.processes);
        let bundle_id = bundle_id.to_string();
        self.ui
            .run(move || processes.pids_for_bundle(&bundle_id))
            .await
    }

    /// Stage (c): process metadata, on the UI-confined thread
    async fn lookup_processes(&self, pids: &BTreeSet<i32>) -> Result<HashMap<i32, AppInfo>> {
        let processes = Arc::clone(&self.sources.processes);
        let pids: Vec<i32> = pids.iter().copied().collect();

        let apps: HashMap<i32, AppInfo> = self
            .ui
            .run(move || {
                pids.into_iter()
                    .filter_map(|pid| processes.app_info(pid).map(|app| (pid, app)))
                    .collect()
            })
            .await?;

        debug!(processes = apps.len(), "Resolved process metadata");
        Ok(apps)
    }

    /// Stage (d): accessibility state per process, on the UI-confined thread
    async fn enrich(
        &self,
        options: &DiscoveryOptions,
        pids: &BTreeSet<i32>,
    ) -> Result<HashMap<u32, AccessibilityWindowInfo>> {
        if !options.enable_accessibility {
            return Ok(HashMap::new());
        }

        let status = self.sources.accessibility.permission_status();
        if status != PermissionStatus::Granted {
            warn!(?status, "Accessibility permission missing, skipping enrichment");
            return Ok(HashMap::new());
        }

        let accessibility = Arc::clone(&self.sources.accessibility);
        let elements = Arc::clone(&self.elements);
        let seed_elements = options.enable_cross_space_caching;
        let budget = self.ax_budget;
        let pids: Vec<i32> = pids.iter().copied().collect();

        let windows = self
            .ui
            .run(move || {
                let mut windows = HashMap::new();
                for pid in pids {
                    match accessibility.windows_for_process(pid, budget) {
                        Ok(found) => {
                            windows.extend(found.windows);
                            if seed_elements {
                                elements.insert_all(found.elements);
                            }
                        }
                        Err(err) => debug!(pid, error = %err, "Accessibility enumeration failed"),
                    }
                }
                windows
            })
            .await?;

        debug!(windows = windows.len(), "Accessibility enrichment complete");
        Ok(windows)
    }

    /// Stage (e): desktop membership and display layout
    fn attach_desktops(&self, options: &DiscoveryOptions, inputs: &mut PassInputs) {
        let spaces = &self.sources.spaces;
        if !spaces.is_available() || !options.needs_desktop_membership() {
            return;
        }

        inputs.window_spaces = inputs
            .windows
            .iter()
            .map(|window| (window.window_id, spaces.spaces_for_window(window.window_id)))
            .filter(|(_, ids)| !ids.is_empty())
            .collect();

        if !options.include_inactive_desktops {
            inputs.active_spaces = spaces.active_spaces();
        }
        if options.enable_desktop_info {
            inputs.displays = spaces.displays();
        }

        debug!(
            with_desktops = inputs.window_spaces.len(),
            active = inputs.active_spaces.len(),
            displays = inputs.displays.len(),
            "Desktop membership resolved"
        );
    }
}
