//! Bounded background executor for activation work

use crate::{Result, ScoutError};
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Runs activation futures on dedicated high-priority threads with at most
/// `max_concurrent` in flight. Submitted work is never retried.
pub struct ActivationQueue {
    handle: Handle,
    /// Taken only on drop, which shuts the workers down in the background
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl std::fmt::Debug for ActivationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationQueue")
            .field("max_concurrent", &self.max_concurrent)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

impl ActivationQueue {
    pub fn new(max_concurrent: usize) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(ScoutError::Validation(
                "Activation concurrency must be at least 1".into(),
            )
            .into());
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(max_concurrent)
            .thread_name("activation")
            .on_thread_start(raise_thread_priority)
            .enable_all()
            .build()
            .map_err(|err| {
                ScoutError::ProviderFailure(format!("Failed to start activation queue: {}", err))
            })?;

        debug!(max_concurrent, "Activation queue started");

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Permits not currently held by running work
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Queue `work`; it starts once a slot frees up and runs to completion
    pub fn submit<F>(&self, work: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let task = async move {
            // The semaphore is never closed while the queue is alive.
            let _permit = permits.acquire_owned().await.ok();
            trace!("Activation slot acquired");
            work.await
        };

        self.handle.spawn(task)
    }
}

impl Drop for ActivationQueue {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(target_os = "macos")]
fn raise_thread_priority() {
    unsafe {
        libc::pthread_set_qos_class_self_np(libc::qos_class_t::QOS_CLASS_USER_INTERACTIVE, 0);
    }
}

#[cfg(not(target_os = "macos"))]
fn raise_thread_priority() {}
