//! The reactor: a dedicated OS thread running a single-threaded Tokio
//! runtime, driving every in-flight transfer through one
//! `FuturesUnordered` instead of a thread-per-request pool. This is the
//! multiplexing core the rest of the gateway feeds and drains.

use crate::coalesce::CoalescingIndex;
use crate::error::GatewayError;
use crate::metrics::Counters;
use crate::queue::AdmissionQueue;
use crate::retry::Outcome;
use crate::retry_tracker::RetryTracker;
use crate::scheduler::TaskScheduler;
use crate::transfer::{Transfer, TransferId};
use crate::transport::{AttemptOutcome, Transport};
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// How long the reactor waits between unprompted admission checks. A wakeup
/// via `Notify` short-circuits this, so the value only bounds worst-case
/// latency for events the wakeup heuristic under-predicts (spurious misses).
const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub(crate) struct SharedState {
    pub(crate) queue: AdmissionQueue,
    pub(crate) coalescing: CoalescingIndex,
    pub(crate) retry_tracker: RetryTracker,
    pub(crate) allocated_bytes: u64,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            queue: AdmissionQueue::new(),
            coalescing: CoalescingIndex::new(),
            retry_tracker: RetryTracker::new(),
            allocated_bytes: 0,
        }
    }
}

/// Everything the reactor thread and caller threads both touch. Deliberately
/// separate from the handle the public `Gateway` owns (see `gateway.rs`) so
/// the reactor thread can hold a genuine strong reference to it without
/// creating an `Arc` cycle back through the thread's own join handle.
pub(crate) struct ReactorShared {
    pub(crate) max_in_flight_count: u64,
    pub(crate) max_simultaneous_bytes: u64,
    pub(crate) state: Mutex<SharedState>,
    pub(crate) notify: Notify,
    pub(crate) shutdown: AtomicBool,
    pub(crate) active_count: AtomicUsize,
    pub(crate) transport: Transport,
    pub(crate) scheduler: Mutex<Option<Arc<dyn TaskScheduler>>>,
}

impl ReactorShared {
    pub(crate) fn new(max_in_flight_count: u64, max_simultaneous_bytes: u64) -> Self {
        Self {
            max_in_flight_count,
            max_simultaneous_bytes,
            state: Mutex::new(SharedState::default()),
            notify: Notify::new(),
            shutdown: AtomicBool::new(false),
            active_count: AtomicUsize::new(0),
            transport: Transport::new(),
            scheduler: Mutex::new(None),
        }
    }

    /// Wake the reactor only when admission could plausibly advance — an
    /// unconditional `notify_waiters()` on every enqueue would mean every
    /// caller thread pays for a reactor wakeup even while the gateway is
    /// already saturated.
    pub(crate) fn maybe_wake(&self, state: &SharedState, incoming_expected_size: u64) {
        let active = self.active_count.load(Ordering::Relaxed) as u64;
        let projected = state.allocated_bytes + incoming_expected_size + crate::content::output_bytes();
        if active < self.max_in_flight_count && projected <= self.max_simultaneous_bytes {
            self.notify.notify_waiters();
        }
    }

    fn scheduler(&self) -> Arc<dyn TaskScheduler> {
        self.scheduler
            .lock()
            .unwrap()
            .clone()
            .expect("scheduler installed before the reactor thread starts")
    }
}

type AttemptFuture = BoxFuture<'static, (TransferId, AttemptOutcome)>;

pub(crate) fn spawn(shared: Arc<ReactorShared>) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("fetch-gateway-reactor".into())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build reactor runtime");
            shared
                .scheduler
                .lock()
                .unwrap()
                .replace(Arc::new(crate::scheduler::TokioTaskScheduler::new(
                    runtime.handle().clone(),
                )));
            runtime.block_on(run(shared));
        })
        .expect("failed to spawn reactor thread")
}

async fn run(shared: Arc<ReactorShared>) {
    let mut active: HashMap<TransferId, Arc<Transfer>> = HashMap::new();
    let mut pending: FuturesUnordered<AttemptFuture> = FuturesUnordered::new();

    loop {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            admit(&shared, &mut active, &mut pending)
        }));
        if result.is_err() {
            // Stand-in for a fatal, multiplexer-global error: nothing here
            // owns a single handle whose failure is process-wide, so a panic
            // inside one iteration's admission logic is treated as that
            // equivalent — every active transfer fails identically, the
            // active set is emptied, and the reactor keeps running rather
            // than taking the whole gateway down.
            tracing::error!("reactor: admission step panicked, failing active transfers");
            for (_, transfer) in active.drain() {
                transfer.fail(GatewayError::Transport(
                    "reactor: fatal internal error".to_string(),
                ));
            }
            shared.active_count.store(0, Ordering::Relaxed);
        }

        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        Counters::perform_cycle();

        if active.is_empty() {
            let _ = tokio::time::timeout(POLL_INTERVAL, shared.notify.notified()).await;
            continue;
        }

        tokio::select! {
            _ = shared.notify.notified() => {}
            Some((id, outcome)) = pending.next() => {
                handle_completion(&shared, &mut active, id, outcome);
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }

    for (_, transfer) in active.drain() {
        transfer.fail(GatewayError::Cancelled);
    }
}

fn admit(
    shared: &Arc<ReactorShared>,
    active: &mut HashMap<TransferId, Arc<Transfer>>,
    pending: &mut FuturesUnordered<AttemptFuture>,
) {
    let mut state = shared.state.lock().unwrap();
    loop {
        if active.len() as u64 >= shared.max_in_flight_count {
            break;
        }
        let Some(head_size) = state.queue.front_expected_size() else {
            break;
        };
        if state.allocated_bytes + head_size > shared.max_simultaneous_bytes {
            break;
        }
        let transfer = state.queue.pop_front().expect("front checked above");
        state.allocated_bytes += transfer.expected_size;
        Counters::set_allocated_bytes(state.allocated_bytes);

        transfer.reset_for_retry();
        let id = TransferId::of(&transfer);
        active.insert(id, transfer.clone());

        let transport_transfer = transfer.clone();
        let shared2 = shared.clone();
        pending.push(Box::pin(async move {
            let outcome = shared2.transport.perform(&transport_transfer).await;
            (id, outcome)
        }));
    }

    shared.active_count.store(active.len(), Ordering::Relaxed);
    Counters::set_in_flight(active.len());
    Counters::set_await_queue_depth(state.queue.len());
    Counters::set_await_queue_head_expected_size(state.queue.front_expected_size().unwrap_or(0));
}

fn handle_completion(
    shared: &Arc<ReactorShared>,
    active: &mut HashMap<TransferId, Arc<Transfer>>,
    id: TransferId,
    outcome: AttemptOutcome,
) {
    let Some(transfer) = active.remove(&id) else {
        return;
    };
    shared.active_count.store(active.len(), Ordering::Relaxed);
    Counters::set_in_flight(active.len());

    let mut state = shared.state.lock().unwrap();
    state.allocated_bytes = state.allocated_bytes.saturating_sub(transfer.expected_size);
    Counters::set_allocated_bytes(state.allocated_bytes);

    let retry_outcome = match &outcome {
        AttemptOutcome::Completed { response_code } => Outcome::Response(*response_code),
        AttemptOutcome::TransportError(_) => Outcome::TransportError,
    };

    let next_delay = if transfer.is_streaming() {
        None
    } else {
        state
            .retry_tracker
            .get_mut(id)
            .and_then(|rs| rs.next_delay(retry_outcome))
    };

    // In all cases — retried or settled — the transfer has left both the
    // queue and the active set by this point, so this is the right moment
    // to collapse the coalescing index once nothing remains to coalesce
    // against.
    if state.queue.is_empty() && active.is_empty() {
        state.coalescing.clear();
    }

    if let Some(delay) = next_delay {
        Counters::retry_scheduled();
        Counters::observe_retry_delay(delay);
        let shared2 = shared.clone();
        let scheduler = shared.scheduler();
        drop(state);
        // If scheduling fails (runtime shutting down), the boxed closure and
        // the `transfer` it captured are simply dropped; `Transfer::drop`
        // then delivers the same synthetic cancellation a graceful shutdown
        // would have produced.
        scheduler.schedule_after(
            Box::new(move || on_retry(&shared2, transfer)),
            delay,
        );
        return;
    }

    state.retry_tracker.remove(id);
    match outcome {
        AttemptOutcome::Completed { response_code } => transfer.done(response_code),
        AttemptOutcome::TransportError(msg) => transfer.fail(GatewayError::Transport(msg)),
    }
}

/// Re-admission entry point for a transfer whose retry delay has elapsed.
/// Called from the scheduler's own task, not the reactor loop, so it takes
/// the shared lock itself rather than assuming the caller already holds it.
fn on_retry(shared: &Arc<ReactorShared>, transfer: Arc<Transfer>) {
    let mut state = shared.state.lock().unwrap();
    let expected_size = transfer.expected_size;
    state.queue.push_back(transfer);
    Counters::set_await_queue_depth(state.queue.len());
    shared.maybe_wake(&state, expected_size);
}
