use crate::activation::{
    ActivationDependencies, ActivationEngine, ActivationQueue, ActivationReport,
    WindowListResolver,
};
use crate::cache::{CacheKey, CacheStatistics, EventKind, EventMonitor, InvalidationEvent, TtlCache};
use crate::config::ScoutConfig;
use crate::discovery::{DiscoveryEngine, DiscoveryOptions, DiscoverySources, WindowSnapshot};
use crate::macos::accessibility::{ElementCache, PermissionStatus, SystemAccessibilityProvider};
use crate::macos::core_graphics::SystemWindowList;
use crate::macos::objc_bridge::spawn_run_loop;
use crate::macos::process::SystemProcessRegistry;
use crate::macos::skylight::Availability;
use crate::macos::spaces::SystemSpaceProvider;
use crate::macos::window_server::{SystemWindowServer, WindowServer};
use crate::permissions::PermissionChecker;
use crate::Result;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

/// Name of the UI-confined thread
const UI_THREAD_NAME: &str = "winscout-ui";

/// The public face of WinScout: cached discovery, invalidation and
/// activation over one explicitly owned set of providers and caches.
pub struct WindowService {
    engine: DiscoveryEngine,
    cache: Arc<TtlCache>,
    monitor: Arc<EventMonitor>,
    elements: Arc<ElementCache>,
    activation: Arc<ActivationEngine>,
    queue: ActivationQueue,
    permissions: Mutex<PermissionChecker>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for WindowService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowService")
            .field("engine", &self.engine)
            .field("cache", &self.cache)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

impl WindowService {
    /// Service backed by the live system providers
    pub fn system(config: &ScoutConfig) -> Result<Self> {
        let skylight = Availability::probe();
        let sources = DiscoverySources {
            window_list: Arc::new(SystemWindowList::new()),
            accessibility: Arc::new(SystemAccessibilityProvider::new()),
            processes: Arc::new(SystemProcessRegistry::new()),
            spaces: Arc::new(SystemSpaceProvider::new(skylight.clone())),
        };
        let server: Arc<dyn WindowServer> = Arc::new(SystemWindowServer::new(skylight));
        Self::with_sources(sources, server, config)
    }

    /// Service over arbitrary providers
    pub fn with_sources(
        sources: DiscoverySources,
        server: Arc<dyn WindowServer>,
        config: &ScoutConfig,
    ) -> Result<Self> {
        crate::config::validate(config)?;

        let ui = Arc::new(spawn_run_loop(UI_THREAD_NAME)?);
        let elements = Arc::new(ElementCache::new());
        let fallback = Arc::new(WindowListResolver::new(Arc::clone(&sources.window_list)));
        let activation = Arc::new(ActivationEngine::new(server, fallback, Arc::clone(&ui)));
        let engine = DiscoveryEngine::new(
            sources,
            ui,
            Arc::clone(&elements),
            config.discovery.engine_settings(),
        );

        let cache = Arc::new(TtlCache::new(config.cache.ttl()));
        let monitor = Arc::new(EventMonitor::new(Arc::clone(&cache)));
        let pruned = Arc::clone(&elements);
        monitor.register_observer(move |event| {
            if let (EventKind::Terminate, Some(pid)) = (event.kind, event.pid) {
                let removed = pruned.remove_process(pid);
                debug!(pid, removed, "Dropped elements of terminated process");
            }
        });

        let queue = ActivationQueue::new(config.activation.max_concurrent)?;

        info!(
            ttl_ms = config.cache.ttl_ms,
            max_concurrent = config.activation.max_concurrent,
            "Window service ready"
        );

        Ok(Self {
            engine,
            cache,
            monitor,
            elements,
            activation,
            queue,
            permissions: Mutex::new(PermissionChecker::default()),
            monitor_task: Mutex::new(None),
        })
    }

    /// Every window passing `options`, served from cache while fresh
    #[instrument(skip_all)]
    pub async fn discover_windows(&self, options: &DiscoveryOptions) -> Result<Vec<WindowSnapshot>> {
        let key = CacheKey::AllWindows(options.clone());
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit.to_vec());
        }

        let snapshots = self.engine.discover(options).await?;
        self.cache.set(key, snapshots.clone()).await;
        Ok(snapshots)
    }

    pub async fn discover_for_process(
        &self,
        pid: i32,
        options: &DiscoveryOptions,
    ) -> Result<Vec<WindowSnapshot>> {
        let key = CacheKey::ByProcess(pid, options.clone());
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit.to_vec());
        }

        let snapshots = self.engine.discover_for_process(pid, options).await?;
        self.cache.set(key, snapshots.clone()).await;
        Ok(snapshots)
    }

    pub async fn discover_for_bundle(
        &self,
        bundle_id: &str,
        options: &DiscoveryOptions,
    ) -> Result<Vec<WindowSnapshot>> {
        let key = CacheKey::ByBundle(bundle_id.to_string(), options.clone());
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit.to_vec());
        }

        let snapshots = self.engine.discover_for_bundle(bundle_id, options).await?;
        self.cache.set(key, snapshots.clone()).await;
        Ok(snapshots)
    }

    /// Queue activation of `window_id`, using the element cache for the raise.
    ///
    /// Fails only when accessibility permission is missing; everything after
    /// that runs in the background and is never retried.
    pub fn activate(&self, window_id: u32, pid: Option<i32>) -> Result<JoinHandle<ActivationReport>> {
        self.submit_activation(window_id, pid, ActivationDependencies::default())
    }

    /// Queue activation with caller-supplied resolvers.
    ///
    /// A missing element resolver falls back to the service's element cache.
    pub fn activate_with(
        &self,
        window_id: u32,
        dependencies: ActivationDependencies,
    ) -> Result<JoinHandle<ActivationReport>> {
        self.submit_activation(window_id, None, dependencies)
    }

    fn submit_activation(
        &self,
        window_id: u32,
        pid: Option<i32>,
        mut dependencies: ActivationDependencies,
    ) -> Result<JoinHandle<ActivationReport>> {
        self.engine.sources().accessibility.ensure_permissions()?;

        if dependencies.element_resolver.is_none() {
            dependencies.element_resolver = Some(self.elements.clone());
        }

        let engine = Arc::clone(&self.activation);
        let queued_at = Instant::now();
        debug!(window_id, ?pid, "Queueing activation");
        Ok(self.queue.submit(async move {
            let report = engine.activate(window_id, pid, dependencies).await;
            debug!(
                window_id,
                elapsed_ms = queued_at.elapsed().as_millis() as u64,
                "Activation finished"
            );
            report
        }))
    }

    /// Running process ids for `bundle_id`, empty when it is not running
    pub async fn running_pids_for_bundle(&self, bundle_id: &str) -> Result<Vec<i32>> {
        self.engine.running_pids_for_bundle(bundle_id).await
    }

    pub async fn invalidate_process(&self, pid: i32) -> usize {
        self.cache.invalidate_process(pid).await
    }

    pub async fn invalidate_bundle(&self, bundle_id: &str) -> usize {
        self.cache.invalidate_bundle(bundle_id).await
    }

    pub async fn clear(&self) -> usize {
        self.cache.clear().await
    }

    pub async fn prune_expired(&self) -> usize {
        self.cache.prune_expired().await
    }

    pub async fn statistics(&self) -> CacheStatistics {
        self.cache.statistics().await
    }

    pub fn reset_statistics(&self) {
        self.cache.reset_statistics();
    }

    pub fn has_accessibility_permission(&self) -> bool {
        self.engine.sources().accessibility.permission_status() == PermissionStatus::Granted
    }

    /// Show the system accessibility prompt; returns whether access is granted now
    pub fn request_accessibility_permission(&self) -> Result<bool> {
        self.permissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .request_permission(crate::permissions::PermissionType::Accessibility)
    }

    pub fn has_screen_recording_permission(&self) -> bool {
        self.permissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .has_screen_recording_permission()
    }

    /// Register a callback for every handled invalidation event
    pub fn register_observer<F>(&self, observer: F)
    where
        F: Fn(&InvalidationEvent) + Send + Sync + 'static,
    {
        self.monitor.register_observer(observer);
    }

    /// Apply one event immediately, returning the cache entries removed
    pub async fn handle_event(&self, event: &InvalidationEvent) -> usize {
        self.monitor.handle(event).await
    }

    /// Feed `events` into the event monitor on a background task
    pub fn attach_event_stream(&self, events: UnboundedReceiver<InvalidationEvent>) {
        let task = Arc::clone(&self.monitor).spawn(events);
        if let Some(previous) = self
            .monitor_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task)
        {
            previous.abort();
        }
    }

    pub fn element_cache(&self) -> &Arc<ElementCache> {
        &self.elements
    }
}

impl Drop for WindowService {
    fn drop(&mut self) {
        if let Ok(mut task) = self.monitor_task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}
