//! Task scheduler contract consumed by the gateway.
//!
//! The generic scheduler is out of scope; this is the narrow interface the
//! gateway needs plus one concrete implementation backed by the reactor's own
//! Tokio runtime handle, so a retry delay never needs a thread of its own.

use std::time::Duration;

/// `schedule_after` returns `true` on successful scheduling. The boxed task
/// is called exactly once, after `delay`, and (per the gateway's usage) does
/// nothing but re-enqueue a transfer via `Gateway::on_retry`.
pub trait TaskScheduler: Send + Sync {
    fn schedule_after(&self, task: Box<dyn FnOnce() + Send + 'static>, delay: Duration) -> bool;
}

/// Schedules tasks on a Tokio runtime handle. Declines to schedule once the
/// handle's runtime is shutting down (`spawn` would panic otherwise).
pub struct TokioTaskScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioTaskScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl TaskScheduler for TokioTaskScheduler {
    fn schedule_after(&self, task: Box<dyn FnOnce() + Send + 'static>, delay: Duration) -> bool {
        let handle = self.handle.clone();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handle.spawn(async move {
                tokio::time::sleep(delay).await;
                task();
            });
        }));
        outcome.is_ok()
    }
}
