//! Scheduling domains.
//!
//! * Cooperative: the tokio worker threads. Request handling and job
//!   supervision live here and must never block.
//! * Blocking: tokio's blocking pool, sized far larger than the worker pool.
//!   Every database transaction, archive read and job body runs here.
//! * Compute: a rayon pool sized to the CPUs for CPU-bound work.
//!
//! Threads running a closure handed to [`Dispatchers::spawn_blocking`] are
//! flagged as blocking-domain threads for the duration of the closure. Only
//! those threads may use [`Dispatchers::run_blocking_bridge`].

use crate::config::ConcurrencySettings;
use anyhow::Context;
use futures::Future;
use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

thread_local! {
    static BLOCKING_DOMAIN: Cell<bool> = const { Cell::new(false) };
}

struct BlockingDomainGuard {
    previous: bool,
}

impl BlockingDomainGuard {
    fn enter() -> Self {
        let previous = BLOCKING_DOMAIN.with(|flag| flag.replace(true));
        Self { previous }
    }
}

impl Drop for BlockingDomainGuard {
    fn drop(&mut self) {
        BLOCKING_DOMAIN.with(|flag| flag.set(self.previous));
    }
}

/// Whether the current thread is running blocking-domain work.
pub fn in_blocking_domain() -> bool {
    BLOCKING_DOMAIN.with(|flag| flag.get())
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Blocking bridge called outside the blocking domain")]
    NotInBlockingDomain,
    #[error("Task panicked: {0}")]
    Panicked(String),
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Clone)]
pub struct Dispatchers {
    handle: Handle,
    compute: Arc<rayon::ThreadPool>,
}

impl Dispatchers {
    pub fn new(handle: Handle, compute_threads: usize) -> anyhow::Result<Self> {
        let compute = rayon::ThreadPoolBuilder::new()
            .num_threads(compute_threads)
            .thread_name(|i| format!("bibliotheca-compute-{}", i))
            .build()
            .context("Failed to build compute pool")?;
        Ok(Self {
            handle,
            compute: Arc::new(compute),
        })
    }

    /// Dispatchers bound to the runtime the caller is running on.
    pub fn current(compute_threads: usize) -> anyhow::Result<Self> {
        let handle = Handle::try_current().context("No tokio runtime available")?;
        Self::new(handle, compute_threads)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Runs `f` on the blocking pool, flagged as blocking-domain work.
    pub fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.spawn_blocking(move || {
            let _guard = BlockingDomainGuard::enter();
            f()
        })
    }

    /// Like [`spawn_blocking`](Self::spawn_blocking) but awaits the result,
    /// turning a panic into an error.
    pub async fn run_blocking<F, R>(&self, f: F) -> Result<R, BridgeError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.spawn_blocking(f).await.map_err(|e| {
            if e.is_panic() {
                BridgeError::Panicked(panic_message(e.into_panic().as_ref()))
            } else {
                BridgeError::Panicked(e.to_string())
            }
        })
    }

    /// Drives `future` to completion on the calling blocking-domain thread.
    ///
    /// Fails fast with [`BridgeError::NotInBlockingDomain`] anywhere else, so
    /// a cooperative worker is never parked waiting on cooperative work.
    pub fn run_blocking_bridge<Fut>(&self, future: Fut) -> Result<Fut::Output, BridgeError>
    where
        Fut: Future,
    {
        if !in_blocking_domain() {
            return Err(BridgeError::NotInBlockingDomain);
        }
        Ok(self.handle.block_on(future))
    }

    /// Runs CPU-bound `f` on the compute pool, waiting synchronously.
    pub fn install<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.compute.install(f)
    }

    /// Runs CPU-bound `f` on the compute pool without blocking the caller.
    pub async fn compute<F, R>(&self, f: F) -> Result<R, BridgeError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.compute.spawn(move || {
            let result = std::panic::catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| panic_message(payload.as_ref()));
            let _ = tx.send(result);
        });
        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(BridgeError::Panicked(message)),
            Err(_) => Err(BridgeError::Panicked(
                "compute task dropped its result".to_string(),
            )),
        }
    }
}

/// Builds the process runtime: a small cooperative worker pool and a large
/// blocking pool.
pub fn build_runtime(settings: &ConcurrencySettings) -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.worker_threads)
        .max_blocking_threads(settings.max_blocking_threads)
        .thread_name("bibliotheca-worker")
        .enable_all()
        .build()
}
