//! Task Pool
//!
//! A small fixed set of named worker threads fed by a crossbeam channel.
//! Value reads and index mutations are submitted here; callers get a
//! `TaskHandle` and block only when they consume the result.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{Result, VaultError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size worker pool
///
/// Jobs run in submission order per worker; with a single worker the
/// pool is a strict FIFO, which the index writer relies on.
pub struct TaskPool {
    /// Queue sender (taken on drop to close the queue)
    sender: Option<Sender<Job>>,
    /// Worker threads (joined on drop)
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Create a pool with an unbounded queue
    pub fn new(name: &str, workers: usize) -> Result<Self> {
        let (sender, receiver) = channel::unbounded();
        Self::spawn(name, workers, sender, receiver)
    }

    /// Create a pool whose queue holds at most `capacity` pending jobs;
    /// `submit` blocks while the queue is full
    pub fn bounded(name: &str, workers: usize, capacity: usize) -> Result<Self> {
        let (sender, receiver) = channel::bounded(capacity);
        Self::spawn(name, workers, sender, receiver)
    }

    fn spawn(
        name: &str,
        workers: usize,
        sender: Sender<Job>,
        receiver: Receiver<Job>,
    ) -> Result<Self> {
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers.max(1) {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, id))
                .spawn(move || Self::worker_loop(receiver))?;
            handles.push(handle);
        }

        Ok(Self {
            sender: Some(sender),
            workers: handles,
        })
    }

    /// Runs until the queue is closed and drained
    fn worker_loop(receiver: Receiver<Job>) {
        for job in receiver.iter() {
            // A panicking job drops its result sender; the waiter sees TaskAborted
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!("Pooled task panicked");
            }
        }
    }

    /// Submit a task and get a handle to its result
    pub fn submit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let (result_tx, result_rx) = channel::bounded(1);
        let job: Job = Box::new(move || {
            // Receiver may be gone if the caller abandoned the handle
            let _ = result_tx.send(task());
        });

        if let Some(sender) = &self.sender {
            // Send only fails once every worker is gone; the handle then reports TaskAborted
            let _ = sender.send(job);
        }

        TaskHandle { receiver: result_rx }
    }

    /// Number of jobs waiting in the queue
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // Closing the queue lets workers finish what is already queued
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("Pool worker exited with a panic");
            }
        }
    }
}

/// Handle to the result of a pooled task
pub struct TaskHandle<T> {
    receiver: Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// A handle that is already complete
    pub fn ready(result: Result<T>) -> Self {
        let (tx, rx) = channel::bounded(1);
        let _ = tx.send(result);
        Self { receiver: rx }
    }

    /// Block until the task finishes and return its result
    pub fn wait(self) -> Result<T> {
        self.receiver.recv().map_err(|_| VaultError::TaskAborted)?
    }

    /// Whether the result is available without blocking
    pub fn is_finished(&self) -> bool {
        !self.receiver.is_empty()
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}
