//! Recurring background task with an explicit start/stop lifecycle

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Owns at most one running timer task
///
/// `start` is idempotent while the task is alive. The task stops itself by
/// returning `ControlFlow::Break`, and is aborted by `stop` or on drop.
#[derive(Debug)]
pub struct Scheduler {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: Mutex::new(None),
        }
    }

    /// Run `task` every `period`, first one full period from now
    ///
    /// Returns false if a task was already running.
    pub fn start<F, Fut>(&self, period: Duration, mut task: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let mut handle = self.lock();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        let name = self.name;
        debug!(scheduler = name, period_ms = period.as_millis() as u64, "Starting scheduler");
        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if task().await.is_break() {
                    debug!(scheduler = name, "Scheduler stopped itself");
                    break;
                }
            }
        }));
        true
    }

    /// Abort the running task; returns false if nothing was running
    pub fn stop(&self) -> bool {
        match self.lock().take() {
            Some(handle) => {
                let was_running = !handle.is_finished();
                handle.abort();
                debug!(scheduler = self.name, "Scheduler stopped");
                was_running
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Forget the current task without aborting it
    ///
    /// Called from inside the task right before it breaks out of its loop,
    /// so a concurrent `start` spawns a fresh task instead of no-oping.
    pub(crate) fn release(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_task(
        counter: Arc<AtomicUsize>,
        stop_after: usize,
    ) -> impl FnMut() -> std::future::Ready<ControlFlow<()>> + Send + 'static {
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(if n >= stop_after {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let scheduler = Scheduler::new("test");
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.start(Duration::from_secs(30), counting_task(counter.clone(), usize::MAX));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let scheduler = Scheduler::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        assert!(scheduler.start(Duration::from_secs(10), counting_task(counter.clone(), usize::MAX)));
        assert!(!scheduler.start(Duration::from_secs(10), counting_task(counter.clone(), usize::MAX)));
        assert!(!scheduler.start(Duration::from_secs(10), counting_task(counter.clone(), usize::MAX)));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_can_stop_itself() {
        let scheduler = Scheduler::new("test");
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.start(Duration::from_secs(1), counting_task(counter.clone(), 2));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(!scheduler.is_running());

        // Can be restarted after stopping itself
        assert!(scheduler.start(Duration::from_secs(1), counting_task(counter.clone(), 3)));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts() {
        let scheduler = Scheduler::new("test");
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.start(Duration::from_secs(1), counting_task(counter.clone(), usize::MAX));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(scheduler.stop());
        assert!(!scheduler.stop());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_running());
    }
}
