//! Bounded worker pool for device operations
//!
//! Descriptors go through a bounded crossbeam queue to a fixed set of
//! worker threads. Every submitted descriptor gets exactly one completion:
//! from a worker once it ran, or immediately on the submitting thread if
//! the queue is full or the executor is shut down.

use super::operations::{Operation, OperationKind};
use crate::config::ExecutorConfig;
use crate::device::Transport;
use crate::error::{MtpError, Result};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// How a queued job is completed
enum Dispatch<'a> {
    /// Run on a worker
    Run(&'a dyn Transport),
    /// Refused before reaching a worker
    Reject(MtpError),
}

/// A type-erased descriptor plus its completion handler
struct Job {
    id: u64,
    kind: OperationKind,
    work: Box<dyn FnOnce(Dispatch<'_>) + Send>,
}

/// Executor statistics
#[derive(Debug, Default)]
pub struct ExecutorStats {
    /// Descriptors submitted
    pub submitted: AtomicU64,
    /// Descriptors that completed successfully
    pub completed: AtomicU64,
    /// Descriptors that completed with an error
    pub failed: AtomicU64,
    /// Descriptors refused without running
    pub rejected: AtomicU64,
    /// Descriptors currently running on a worker
    pub in_flight: AtomicUsize,
}

impl ExecutorStats {
    /// Get completion percentage
    pub fn completion_percentage(&self) -> f64 {
        let done = self.completed.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed);
        let total = self.submitted.load(Ordering::Relaxed);

        if total == 0 {
            0.0
        } else {
            (done as f64 / total as f64) * 100.0
        }
    }

    /// Check if every submitted descriptor has completed
    pub fn is_idle(&self) -> bool {
        let done = self.completed.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed);
        done == self.submitted.load(Ordering::Relaxed)
    }

    fn record(&self, success: bool) {
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Runs operation descriptors on a bounded pool of worker threads
pub struct TaskExecutor {
    /// Queue sender; `None` once shut down
    sender: Mutex<Option<Sender<Job>>>,
    /// Worker join handles
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Shutdown flag
    shutdown: AtomicBool,
    /// Statistics
    stats: Arc<ExecutorStats>,
    /// Next descriptor id
    next_id: AtomicU64,
    /// Configured queue capacity
    queue_size: usize,
}

impl TaskExecutor {
    /// Start the worker pool
    pub fn new(transport: Arc<dyn Transport>, config: &ExecutorConfig) -> Result<Self> {
        let queue_size = config.queue_size.max(1);
        let threads = config.effective_workers();
        let (sender, receiver) = bounded(queue_size);

        let executor = Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(Vec::with_capacity(threads)),
            shutdown: AtomicBool::new(false),
            stats: Arc::new(ExecutorStats::default()),
            next_id: AtomicU64::new(0),
            queue_size,
        };

        for worker_id in 0..threads {
            let rx = receiver.clone();
            let transport = Arc::clone(&transport);
            let stats = Arc::clone(&executor.stats);

            let spawned = thread::Builder::new()
                .name(format!("mtp-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, rx, transport, stats));

            match spawned {
                Ok(handle) => lock(&executor.workers).push(handle),
                Err(e) => {
                    executor.shutdown();
                    return Err(MtpError::ResourceExhaustion(format!(
                        "spawn worker {}: {}",
                        worker_id, e
                    )));
                }
            }
        }

        tracing::info!("Task executor started with {} worker(s), queue size {}", threads, queue_size);
        Ok(executor)
    }

    /// Submit a descriptor. Never blocks on device I/O; `handler` is called
    /// exactly once with the outcome. Returns the descriptor id.
    pub fn submit<O, H>(&self, op: O, handler: H) -> u64
    where
        O: Operation,
        H: FnOnce(Result<O::Output>) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let stats = Arc::clone(&self.stats);
        let job = Job {
            id,
            kind: O::KIND,
            work: Box::new(move |dispatch: Dispatch<'_>| {
                let outcome = match dispatch {
                    Dispatch::Run(transport) => {
                        let outcome = run_contained(op, transport);
                        stats.in_flight.fetch_sub(1, Ordering::Relaxed);
                        outcome
                    }
                    Dispatch::Reject(err) => {
                        stats.rejected.fetch_add(1, Ordering::Relaxed);
                        Err(err)
                    }
                };

                match &outcome {
                    Ok(_) => tracing::debug!("Task {} ({}) completed", id, O::KIND),
                    Err(e) => tracing::debug!("Task {} ({}) failed: {}", id, O::KIND, e),
                }
                stats.record(outcome.is_ok());

                if catch_unwind(AssertUnwindSafe(|| handler(outcome))).is_err() {
                    tracing::error!("Completion handler of task {} ({}) panicked", id, O::KIND);
                }
            }),
        };

        let refused = {
            let sender = lock(&self.sender);
            match sender.as_ref() {
                None => Some((job, MtpError::ExecutorShutdown)),
                Some(tx) => match tx.try_send(job) {
                    Ok(()) => None,
                    Err(TrySendError::Full(job)) => Some((
                        job,
                        MtpError::ResourceExhaustion(format!(
                            "executor queue full ({} pending)",
                            self.queue_size
                        )),
                    )),
                    Err(TrySendError::Disconnected(job)) => Some((job, MtpError::ExecutorShutdown)),
                },
            }
        };

        if let Some((job, err)) = refused {
            tracing::warn!("Task {} ({}) refused: {}", job.id, job.kind, err);
            (job.work)(Dispatch::Reject(err));
        }

        id
    }

    /// Submit and block until the outcome arrives.
    ///
    /// Must not be called from a completion handler or an operation running
    /// on this executor.
    pub fn call<O: Operation>(&self, op: O) -> Result<O::Output> {
        let (tx, rx) = bounded(1);
        self.submit(op, move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.recv().unwrap_or(Err(MtpError::ExecutorShutdown))
    }

    /// Get statistics
    pub fn stats(&self) -> Arc<ExecutorStats> {
        Arc::clone(&self.stats)
    }

    /// Get number of queued descriptors not yet picked up
    pub fn pending_count(&self) -> usize {
        lock(&self.sender).as_ref().map(Sender::len).unwrap_or(0)
    }

    /// Get number of worker threads
    pub fn worker_count(&self) -> usize {
        lock(&self.workers).len()
    }

    /// Check if shutdown was signaled
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Stop accepting work, let workers drain the queue, and join them.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        // Dropping the only sender lets workers finish the queue, then exit
        drop(lock(&self.sender).take());

        let handles: Vec<_> = lock(&self.workers).drain(..).collect();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("Executor worker exited abnormally");
            }
        }

        tracing::info!(
            "Task executor stopped ({} completed, {} failed)",
            self.stats.completed.load(Ordering::Relaxed),
            self.stats.failed.load(Ordering::Relaxed)
        );
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn worker_loop(
    worker_id: usize,
    rx: Receiver<Job>,
    transport: Arc<dyn Transport>,
    stats: Arc<ExecutorStats>,
) {
    tracing::debug!("Worker {} started", worker_id);

    while let Ok(job) = rx.recv() {
        stats.in_flight.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Worker {} running task {} ({})", worker_id, job.id, job.kind);
        (job.work)(Dispatch::Run(transport.as_ref()));
    }

    tracing::debug!("Worker {} stopped", worker_id);
}

/// Run an operation, turning a panic inside it into an error outcome
fn run_contained<O: Operation>(op: O, transport: &dyn Transport) -> Result<O::Output> {
    catch_unwind(AssertUnwindSafe(|| op.run(transport))).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::error!("Operation {} panicked: {}", O::KIND, message);
        Err(MtpError::WorkerPanic {
            kind: O::KIND,
            message,
        })
    })
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
