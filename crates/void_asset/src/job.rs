//! Job scheduling
//!
//! A fixed pool of named worker threads pulls boxed jobs from a
//! crossbeam channel. Scheduling a job returns a [`SharedFuture`] that any
//! number of clones can wait on or poll. A job that panics, or that is
//! dropped because the pool shut down first, resolves its future with a
//! [`JobError`] instead of leaving waiters blocked.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Failure of a scheduled job itself (not of its payload)
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("Job '{0}' panicked: {1}")]
    Panicked(String, String),

    #[error("Job was cancelled before it ran")]
    Cancelled,
}

type Continuation = Box<dyn FnOnce() + Send + 'static>;

struct FutureInner<T> {
    result: Option<Result<T, JobError>>,
    continuations: Vec<Continuation>,
}

struct FutureState<T> {
    inner: Mutex<FutureInner<T>>,
    ready: Condvar,
}

impl<T> FutureState<T> {
    fn new() -> Self {
        Self {
            inner: Mutex::new(FutureInner {
                result: None,
                continuations: Vec::new(),
            }),
            ready: Condvar::new(),
        }
    }

    fn complete(&self, result: Result<T, JobError>) {
        let continuations = {
            let mut inner = self.inner.lock();
            if inner.result.is_some() {
                return;
            }
            inner.result = Some(result);
            std::mem::take(&mut inner.continuations)
        };
        self.ready.notify_all();
        for continuation in continuations {
            continuation();
        }
    }
}

/// Cloneable, waitable result of a job
pub struct SharedFuture<T> {
    state: Arc<FutureState<T>>,
}

impl<T> Clone for SharedFuture<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> std::fmt::Debug for SharedFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFuture")
            .field("ready", &self.state.inner.lock().result.is_some())
            .finish()
    }
}

impl<T: Clone + Send + 'static> SharedFuture<T> {
    /// A future that is already resolved
    pub fn ready(value: T) -> Self {
        let state = FutureState::new();
        state.inner.lock().result = Some(Ok(value));
        Self {
            state: Arc::new(state),
        }
    }

    /// Whether the job has finished
    pub fn is_ready(&self) -> bool {
        self.state.inner.lock().result.is_some()
    }

    /// Result if finished, without blocking
    pub fn try_get(&self) -> Option<Result<T, JobError>> {
        self.state.inner.lock().result.clone()
    }

    /// Block until the job finishes
    pub fn wait(&self) -> Result<T, JobError> {
        let mut inner = self.state.inner.lock();
        loop {
            if let Some(result) = inner.result.as_ref() {
                return result.clone();
            }
            self.state.ready.wait(&mut inner);
        }
    }

    /// Run `f` once the future resolves (immediately if it already has)
    pub fn on_ready(&self, f: impl FnOnce() + Send + 'static) {
        {
            let mut inner = self.state.inner.lock();
            if inner.result.is_none() {
                inner.continuations.push(Box::new(f));
                return;
            }
        }
        f();
    }

    /// Whether two futures share the same job
    pub fn same_job(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Write side of a [`SharedFuture`]
///
/// Dropping an unfulfilled promise resolves the future as cancelled.
pub struct Promise<T> {
    state: Option<Arc<FutureState<T>>>,
}

impl<T> Promise<T> {
    /// Resolve the future
    pub fn fulfill(mut self, result: Result<T, JobError>) {
        if let Some(state) = self.state.take() {
            state.complete(result);
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.complete(Err(JobError::Cancelled));
        }
    }
}

/// Create a connected promise / future pair
pub fn promise<T>() -> (Promise<T>, SharedFuture<T>) {
    let state = Arc::new(FutureState::new());
    (
        Promise {
            state: Some(state.clone()),
        },
        SharedFuture { state },
    )
}

/// Future that resolves once every input has resolved
///
/// Results keep the input order. The first failed input fails the whole set.
pub fn when_all<T: Clone + Send + 'static>(futures: Vec<SharedFuture<T>>) -> SharedFuture<Vec<T>> {
    let (promise, combined) = promise::<Vec<T>>();
    if futures.is_empty() {
        promise.fulfill(Ok(Vec::new()));
        return combined;
    }

    let remaining = Arc::new(AtomicUsize::new(futures.len()));
    let promise = Arc::new(Mutex::new(Some(promise)));
    let inputs = Arc::new(futures);

    for future in inputs.iter() {
        let remaining = remaining.clone();
        let promise = promise.clone();
        let inputs = inputs.clone();
        future.on_ready(move || {
            if remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
                return;
            }
            let results = inputs
                .iter()
                .map(|f| f.try_get().unwrap_or(Err(JobError::Cancelled)))
                .collect::<Result<Vec<T>, JobError>>();
            if let Some(promise) = promise.lock().take() {
                promise.fulfill(results);
            }
        });
    }

    combined
}

struct QueuedJob {
    name: String,
    run: Box<dyn FnOnce() + Send + 'static>,
}

/// Fixed-size worker pool
pub struct JobPool {
    sender: Option<Sender<QueuedJob>>,
    workers: Vec<JoinHandle<()>>,
    in_flight: Arc<AtomicUsize>,
}

impl JobPool {
    /// Spawn `workers` named threads (at least one)
    pub fn new(workers: usize) -> std::io::Result<Self> {
        let count = workers.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<QueuedJob>();
        let in_flight = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let receiver = receiver.clone();
            let in_flight = in_flight.clone();
            let handle = thread::Builder::new()
                .name(format!("void-asset-worker-{}", index))
                .spawn(move || worker_loop(receiver, in_flight))?;
            handles.push(handle);
        }

        log::debug!("Job pool started with {} workers", count);

        Ok(Self {
            sender: Some(sender),
            workers: handles,
            in_flight,
        })
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Jobs queued or running
    pub fn pending(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Schedule a named job and return its shared future
    pub fn schedule<T, F>(&self, name: impl Into<String>, job: F) -> SharedFuture<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let name = name.into();
        let (promise, future) = promise::<T>();
        let job_name = name.clone();

        let run = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(job))
                .map_err(|payload| JobError::Panicked(job_name.clone(), panic_message(&*payload)));
            if let Err(err) = &result {
                log::error!("{}", err);
            }
            promise.fulfill(result);
        });

        match &self.sender {
            Some(sender) => {
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                if sender.send(QueuedJob { name, run }).is_err() {
                    self.in_flight.fetch_sub(1, Ordering::AcqRel);
                    log::error!("Job pool is shut down, job cancelled");
                }
            }
            None => log::error!("Job pool is shut down, job '{}' cancelled", name),
        }

        future
    }
}

fn worker_loop(receiver: Receiver<QueuedJob>, in_flight: Arc<AtomicUsize>) {
    while let Ok(job) = receiver.recv() {
        log::trace!("Running job '{}'", job.name);
        (job.run)();
        in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Job worker exited abnormally");
            }
        }
    }
}
