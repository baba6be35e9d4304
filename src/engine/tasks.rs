//! Bounded pool for background download tasks.
//!
//! Each task runs on the tokio runtime, gated by a semaphore so at most
//! `max_concurrent` downloads touch the network at once. Finished handles
//! accumulate until the owner calls `reap`; there is no internal timer. An
//! in-flight id set makes a second spawn for the same id a no-op, closing
//! the double-download race between concurrent requests for one entry.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct DownloadPool {
    tasks: Mutex<JoinSet<()>>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl DownloadPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Launch a task for `id` unless one is already in flight.
    ///
    /// Returns false (and drops the task) when the id is already being
    /// worked on.
    pub fn spawn<F>(&self, id: String, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(id.clone()) {
                return false;
            }
        }

        let semaphore = self.semaphore.clone();
        let in_flight = self.in_flight.clone();
        self.tasks.lock().unwrap().spawn(async move {
            // Closed semaphore only happens at shutdown; skip the work then.
            if let Ok(_permit) = semaphore.acquire_owned().await {
                task.await;
            }
            in_flight.lock().unwrap().remove(&id);
        });
        true
    }

    /// Prune finished task handles. Returns how many were reaped. Must be
    /// called periodically by the owner; nothing is pruned automatically.
    pub fn reap(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap();
        let mut reaped = 0;
        while tasks.try_join_next().is_some() {
            reaped += 1;
        }
        reaped
    }

    /// Number of retained handles, finished or not.
    pub fn handle_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight.lock().unwrap().contains(id)
    }

    /// Wait for every retained task to finish and prune the handles.
    pub async fn drain(&self) {
        loop {
            let joined = self.tasks.lock().unwrap().try_join_next();
            match joined {
                Some(_) => continue,
                None if self.tasks.lock().unwrap().is_empty() => break,
                None => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        }
    }
}
