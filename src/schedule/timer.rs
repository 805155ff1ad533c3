//! Cancellable recurring timers backed by tokio tasks
//!
//! Each timer sleeps until the next fire time of its `Recurrence`, then spawns
//! the job as a detached task so a slow run never delays the next firing.
//! Cancelling a timer stops future firings; jobs already running finish.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Clock, Recurrence};

/// Handle to one running recurring timer
#[derive(Debug)]
pub struct RecurringTimer {
    name: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RecurringTimer {
    /// Spawn a timer that runs `job` at every fire time of `recurrence`.
    pub fn spawn<F, Fut>(
        name: impl Into<String>,
        recurrence: Recurrence,
        clock: Arc<dyn Clock>,
        job: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            debug!(timer = %task_name, schedule = %recurrence, "Timer armed");
            loop {
                let now = clock.now();
                let Some(next) = recurrence.next_after(now) else {
                    warn!(timer = %task_name, "No further fire time, timer exits");
                    break;
                };
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(wait) => {}
                }

                debug!(timer = %task_name, "Timer fired");
                tokio::spawn(job());
            }
            debug!(timer = %task_name, "Timer stopped");
        });

        Self {
            name,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop future firings (idempotent).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Named collection of timers cancelled together
#[derive(Debug, Default)]
pub struct TimerSet {
    timers: HashMap<String, RecurringTimer>,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a timer, cancelling any previous timer with the same name.
    pub fn insert(&mut self, timer: RecurringTimer) {
        if let Some(previous) = self.timers.insert(timer.name().to_string(), timer) {
            previous.cancel();
        }
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.timers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Cancel and drop every timer. Safe to call repeatedly.
    pub fn cancel_all(&mut self) {
        for (name, timer) in self.timers.drain() {
            timer.cancel();
            info!(timer = %name, "Stopped timer");
        }
    }
}
