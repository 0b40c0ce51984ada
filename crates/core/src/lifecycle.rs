//! Process lifecycle: single-instance lock, signals, shutdown hooks
//!
//! Every long-lived component (connection monitor, event pipeline,
//! servers) registers a shutdown hook here. On SIGINT/SIGTERM the
//! registry first fires the cancellation broadcast, then runs hooks
//! sequentially in registration order, each under a bounded deadline.
//! SIGHUP broadcasts a configuration-reload notification.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// Deadline applied to each shutdown hook so a stuck component cannot
/// deadlock shutdown
const HOOK_DEADLINE: Duration = Duration::from_secs(10);

/// Single-instance lock backed by a PID file
///
/// The PID file is the OS-level concurrency control across agent
/// processes. The file is removed again when the lock is dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Acquire the single-instance lock at `path`
    ///
    /// Empty or malformed content is treated as stale and reclaimed. A
    /// decimal PID is probed for liveness with signal 0: if the process
    /// exists the acquisition fails with `AlreadyRunning`, otherwise the
    /// stale entry is removed. The current PID is then written atomically
    /// (write to a sibling temp file, then rename).
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Ok(content) = std::fs::read_to_string(&path) {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                tracing::debug!(path = %path.display(), "empty pid file, reclaiming");
            } else {
                match trimmed.parse::<i32>() {
                    // Zero and negative values would signal a whole
                    // process group in the liveness probe
                    Ok(pid) if pid <= 0 => {
                        tracing::warn!(
                            path = %path.display(),
                            "malformed pid file, reclaiming"
                        );
                    }
                    Ok(pid) if pid != std::process::id() as i32 && process_alive(pid) => {
                        return Err(Error::AlreadyRunning { pid });
                    }
                    Ok(pid) => {
                        tracing::info!(stale_pid = pid, "reclaiming stale pid file");
                    }
                    Err(_) => {
                        tracing::warn!(
                            path = %path.display(),
                            "malformed pid file, reclaiming"
                        );
                    }
                }
            }
            std::fs::remove_file(&path)?;
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = path.with_extension("pid.tmp");
        std::fs::write(&tmp, std::process::id().to_string())?;
        std::fs::rename(&tmp, &path)?;

        tracing::debug!(path = %path.display(), pid = std::process::id(), "pid file acquired");
        Ok(Self { path })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
        }
    }
}

/// Probe a PID with signal 0: delivery is not attempted, success or
/// EPERM both mean the process exists
fn process_alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

type HookFn = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Lifecycle registry: cancellation fan-out plus the ordered shutdown
/// hook list
pub struct Lifecycle {
    shutdown_tx: broadcast::Sender<()>,
    reload_tx: broadcast::Sender<()>,
    hooks: Mutex<Vec<(String, HookFn)>>,
    /// Set as soon as shutdown is asked for (signal or explicit)
    shutdown_requested: AtomicBool,
    /// Set once the hook sequence has begun
    shutting_down: AtomicBool,
    hook_deadline: Duration,
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("shutting_down", &self.shutting_down.load(Ordering::SeqCst))
            .field("hooks", &self.hooks.lock().unwrap().len())
            .finish()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Create an empty registry
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (reload_tx, _) = broadcast::channel(4);
        Self {
            shutdown_tx,
            reload_tx,
            hooks: Mutex::new(Vec::new()),
            shutdown_requested: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            hook_deadline: HOOK_DEADLINE,
        }
    }

    /// Register a shutdown hook
    ///
    /// Hooks run sequentially in registration order, each under a 10s
    /// deadline. Registration after shutdown has begun is rejected with
    /// a warning; the hook list is never reordered once shutdown starts.
    pub fn on_shutdown<F, Fut>(&self, name: impl Into<String>, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if self.shutting_down.load(Ordering::SeqCst) {
            tracing::warn!(hook = %name, "shutdown already begun, hook not registered");
            return;
        }
        self.hooks
            .lock()
            .unwrap()
            .push((name, Box::new(move || Box::pin(hook()))));
    }

    /// Subscribe to the cancellation broadcast
    ///
    /// Every long-lived task selects on this and exits promptly at its
    /// next suspension point.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Subscribe to configuration-reload notifications (SIGHUP)
    pub fn subscribe_reload(&self) -> broadcast::Receiver<()> {
        self.reload_tx.subscribe()
    }

    /// Whether the hook sequence has begun
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Whether shutdown has been asked for
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Fire the cancellation broadcast without running hooks
    ///
    /// Used by the signal listener; the owner of the registry follows up
    /// with [`Lifecycle::shutdown`].
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// Block until shutdown is requested
    pub async fn wait_for_shutdown(&self) {
        if self.is_shutdown_requested() {
            return;
        }
        let mut rx = self.subscribe_shutdown();
        // A request between the check and the subscription would
        // otherwise be missed
        if self.is_shutdown_requested() {
            return;
        }
        let _ = rx.recv().await;
    }

    /// Run the shutdown sequence: cancellation first, then hooks in
    /// registration order
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown_requested.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());

        let hooks: Vec<(String, HookFn)> = std::mem::take(&mut *self.hooks.lock().unwrap());
        tracing::info!(hooks = hooks.len(), "running shutdown hooks");

        for (name, hook) in hooks {
            match tokio::time::timeout(self.hook_deadline, hook()).await {
                Ok(()) => tracing::debug!(hook = %name, "shutdown hook finished"),
                Err(_) => tracing::warn!(
                    hook = %name,
                    deadline = ?self.hook_deadline,
                    "shutdown hook exceeded deadline, abandoned"
                ),
            }
        }
    }

    /// Spawn the signal dispatcher
    ///
    /// SIGINT/SIGTERM request shutdown and end the task; SIGHUP
    /// broadcasts a reload notification and keeps listening.
    pub fn spawn_signal_listener(self: &std::sync::Arc<Self>) -> Result<JoinHandle<()>> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())
            .map_err(|e| Error::Lifecycle(format!("failed to install SIGINT handler: {}", e)))?;
        let mut terminate = signal(SignalKind::terminate())
            .map_err(|e| Error::Lifecycle(format!("failed to install SIGTERM handler: {}", e)))?;
        let mut hangup = signal(SignalKind::hangup())
            .map_err(|e| Error::Lifecycle(format!("failed to install SIGHUP handler: {}", e)))?;

        let lifecycle = self.clone();
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = interrupt.recv() => {
                        tracing::info!("SIGINT received, shutting down");
                        lifecycle.request_shutdown();
                        break;
                    }
                    _ = terminate.recv() => {
                        tracing::info!("SIGTERM received, shutting down");
                        lifecycle.request_shutdown();
                        break;
                    }
                    _ = hangup.recv() => {
                        tracing::info!("SIGHUP received, broadcasting reload");
                        let _ = lifecycle.reload_tx.send(());
                    }
                }
            }
        }))
    }

    #[cfg(test)]
    fn with_hook_deadline(deadline: Duration) -> Self {
        let mut lc = Self::new();
        lc.hook_deadline = deadline;
        lc
    }
}
