//! One-shot timers used for token renewal.
//!
//! The client never touches the runtime timer directly; it asks a [`Scheduler`]
//! to run a task after a delay and keeps the returned [`TimerHandle`].
//! [`ManualScheduler`] lets tests fire timers without waiting on the wall clock.

use crate::lock;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type ScheduledTask = BoxFuture<'static, ()>;

pub trait Scheduler: Send + Sync {
    /// Runs `task` once after `delay`.
    fn after(&self, delay: Duration, task: ScheduledTask) -> TimerHandle;
}

/// Handle to an armed timer.
///
/// Dropping a handle detaches the timer; call [`TimerHandle::cancel`] to stop it.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle").finish_non_exhaustive()
    }
}

/// Scheduler backed by `tokio::spawn` and `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, task: ScheduledTask) -> TimerHandle {
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        TimerHandle::new(move || join.abort())
    }
}

pub fn default_scheduler() -> Arc<dyn Scheduler> {
    Arc::new(TokioScheduler)
}

struct PendingTimer {
    delay: Duration,
    task: ScheduledTask,
    cancelled: Arc<AtomicBool>,
}

/// Scheduler that only runs timers when told to. Intended for tests.
#[derive(Default)]
pub struct ManualScheduler {
    timers: Mutex<Vec<PendingTimer>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays of timers that are armed and not cancelled, in arming order.
    pub fn pending(&self) -> Vec<Duration> {
        lock(&self.timers)
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .map(|t| t.delay)
            .collect()
    }

    /// Runs the oldest live timer to completion. Returns false when none is armed.
    pub async fn fire_next(&self) -> bool {
        let next = {
            let mut timers = lock(&self.timers);
            timers.retain(|t| !t.cancelled.load(Ordering::SeqCst));
            if timers.is_empty() {
                None
            } else {
                Some(timers.remove(0))
            }
        };

        match next {
            Some(timer) => {
                timer.task.await;
                true
            }
            None => false,
        }
    }
}

impl Scheduler for ManualScheduler {
    fn after(&self, delay: Duration, task: ScheduledTask) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        lock(&self.timers).push(PendingTimer {
            delay,
            task,
            cancelled: Arc::clone(&cancelled),
        });
        TimerHandle::new(move || cancelled.store(true, Ordering::SeqCst))
    }
}
