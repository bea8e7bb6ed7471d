use crate::{Result, ScoutError};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;

/// Messages dispatched to the UI-confined thread
enum RunLoopMessage {
    Execute(Box<dyn FnOnce() + Send + 'static>),
    Shutdown,
}

/// Handle to the single thread that owns process-registry and accessibility
/// queries. Every call into those APIs is serialized through it.
pub struct RunLoopHandle {
    name: String,
    sender: Sender<RunLoopMessage>,
    join_handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RunLoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoopHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl RunLoopHandle {
    /// Dispatch work to the run loop thread without waiting for it
    pub fn dispatch<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(RunLoopMessage::Execute(Box::new(work)))
            .map_err(|_| {
                ScoutError::ProviderFailure(format!(
                    "Failed to dispatch work onto run loop '{}'",
                    self.name
                ))
            })?;

        Ok(())
    }

    /// Run `work` on the confined thread and suspend until it completes
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.dispatch(move || {
            // The receiver may have been dropped by a cancelled caller.
            let _ = tx.send(work());
        })?;

        rx.await.map_err(|_| {
            ScoutError::ProviderFailure(format!(
                "Run loop '{}' dropped work before completion",
                self.name
            ))
            .into()
        })
    }

    /// Signal the run loop to terminate and wait for the background thread
    pub fn shutdown(mut self) -> Result<()> {
        self.sender.send(RunLoopMessage::Shutdown).map_err(|_| {
            ScoutError::ProviderFailure(format!(
                "Failed to signal shutdown for run loop '{}'",
                self.name
            ))
        })?;

        if let Some(handle) = self.join_handle.take() {
            handle.join().map_err(|_| {
                ScoutError::ProviderFailure(format!(
                    "Run loop '{}' panicked during shutdown",
                    self.name
                ))
            })?;
        }

        Ok(())
    }
}

/// Spawn the confined thread and return a handle for dispatching work
pub fn spawn_run_loop(name: impl Into<String>) -> Result<RunLoopHandle> {
    let name = name.into();
    let (sender, receiver) = mpsc::channel::<RunLoopMessage>();
    let thread_name = name.clone();

    let join_handle = thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            while let Ok(message) = receiver.recv() {
                match message {
                    RunLoopMessage::Execute(work) => work(),
                    RunLoopMessage::Shutdown => break,
                }
            }
        })
        .map_err(|err| {
            ScoutError::ProviderFailure(format!(
                "Failed to spawn run loop '{}' thread: {}",
                thread_name, err
            ))
        })?;

    Ok(RunLoopHandle {
        name,
        sender,
        join_handle: Some(join_handle),
    })
}
