//! Background task dispatch
//!
//! A small fixed pool of named threads, each fed by its own channel. Tasks
//! go to the least-loaded worker and report their outcome on the event bus.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{Error, Result};
use crate::event_bus::{event_bus, AppEvent, EventBus, TaskEvent};

/// Number of workers in a default stack
pub const DEFAULT_WORKERS: usize = 2;

type Job = Box<dyn FnOnce(&TaskContext) -> Result<()> + Send + 'static>;

struct Envelope {
    name: String,
    job: Job,
}

/// Handed to a running task so it can report progress
pub struct TaskContext {
    name: String,
    worker: usize,
    bus: &'static EventBus,
}

impl TaskContext {
    /// Task name given to [`WorkerStack::add_task`]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the worker running this task
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Publish advisory progress, clamped to 100.
    pub fn progress(&self, percent: u8) {
        self.bus.notify(AppEvent::Task(TaskEvent::Progress {
            name: self.name.clone(),
            percent: percent.min(100),
        }));
    }
}

struct Worker {
    sender: Option<Sender<Envelope>>,
    handle: Option<JoinHandle<()>>,
}

/// Fixed pool of background workers
pub struct WorkerStack {
    workers: Vec<Worker>,
    load: Arc<Vec<AtomicUsize>>,
    bus: &'static EventBus,
}

impl WorkerStack {
    /// Two workers publishing on the global event bus
    pub fn new() -> Result<Self> {
        Self::with_bus(DEFAULT_WORKERS, event_bus())
    }

    pub fn with_bus(count: usize, bus: &'static EventBus) -> Result<Self> {
        let count = count.max(1);
        let load: Arc<Vec<AtomicUsize>> = Arc::new((0..count).map(|_| AtomicUsize::new(0)).collect());
        let mut workers = Vec::with_capacity(count);

        for index in 0..count {
            let (tx, rx) = mpsc::channel::<Envelope>();
            let load = Arc::clone(&load);
            let handle = thread::Builder::new()
                .name(format!("Worker-{}", index))
                .spawn(move || {
                    while let Ok(envelope) = rx.recv() {
                        run_job(index, envelope, bus);
                        load[index].fetch_sub(1, Ordering::SeqCst);
                    }
                    tracing::debug!("Worker-{} exiting", index);
                })?;
            workers.push(Worker {
                sender: Some(tx),
                handle: Some(handle),
            });
        }

        Ok(Self { workers, load, bus })
    }

    /// Queue a task on the least-loaded worker. Returns the worker index.
    pub fn add_task<F>(&self, name: impl Into<String>, task: F) -> Result<usize>
    where
        F: FnOnce(&TaskContext) -> Result<()> + Send + 'static,
    {
        let name = name.into();
        let index = self
            .load
            .iter()
            .enumerate()
            .min_by_key(|(i, l)| (l.load(Ordering::SeqCst), *i))
            .map(|(i, _)| i)
            .unwrap_or(0);

        let sender = self.workers[index]
            .sender
            .as_ref()
            .ok_or_else(|| Error::other(format!("Worker-{} is shut down", index)))?;

        self.load[index].fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Task {} -> Worker-{}", name, index);
        if sender
            .send(Envelope {
                name: name.clone(),
                job: Box::new(task),
            })
            .is_err()
        {
            self.load[index].fetch_sub(1, Ordering::SeqCst);
            return Err(Error::other(format!("Worker-{} is not accepting tasks", index)));
        }
        Ok(index)
    }

    /// Pending and running tasks per worker
    pub fn loads(&self) -> Vec<usize> {
        self.load.iter().map(|l| l.load(Ordering::SeqCst)).collect()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn bus(&self) -> &'static EventBus {
        self.bus
    }
}

fn run_job(worker: usize, envelope: Envelope, bus: &'static EventBus) {
    let Envelope { name, job } = envelope;
    let ctx = TaskContext {
        name: name.clone(),
        worker,
        bus,
    };
    bus.notify(AppEvent::Task(TaskEvent::Started {
        name: name.clone(),
        worker,
    }));

    let event = match catch_unwind(AssertUnwindSafe(|| job(&ctx))) {
        Ok(Ok(())) => TaskEvent::Completed { name, worker },
        Ok(Err(e)) => {
            tracing::error!("Task {} failed: {}", name, e);
            TaskEvent::Failed {
                name,
                worker,
                reason: e.to_string(),
            }
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            tracing::error!("Task {} panicked: {}", name, reason);
            TaskEvent::Failed {
                name,
                worker,
                reason,
            }
        }
    };
    bus.notify(AppEvent::Task(event));
}

impl Drop for WorkerStack {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            worker.sender.take();
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}
