//! The gateway facade: the only public entry point for submitting transfers.
//! Wraps the reactor's shared state and thread, exposes `download_buffered`
//! and `download_stream`, and hands back a process-wide singleton through a
//! weak-pointer `make`, so any already-live instance is reused regardless of
//! the limits a later caller asks for.

use crate::error::{ErrorList, GatewayError};
use crate::key::RequestKey;
use crate::reactor::{self, ReactorShared};
use crate::retry::RetryPolicy;
use crate::transfer::{OnChunk, OnFinish, ResultCallback, Transfer, TransferId};
use bytes::Bytes;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, OnceLock, Weak};

struct Inner {
    reactor: Arc<ReactorShared>,
    reactor_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.reactor.shutdown.store(true, Ordering::Release);
        self.reactor.notify.notify_waiters();
        if let Some(handle) = self.reactor_thread.lock().unwrap().take() {
            // A panicked reactor thread still needs joining to avoid leaking
            // the OS thread; its panic payload is not this drop's concern.
            let _ = handle.join();
        }
    }
}

/// Ceiling on a single transfer's `expected_size`, applied synchronously at
/// submission time: the gateway never admits a request it already knows can
/// never fit inside the configured byte budget.
#[derive(Debug, Clone, Copy)]
pub struct GatewayLimits {
    pub max_in_flight_count: u64,
    pub max_simultaneous_bytes: u64,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        Self {
            max_in_flight_count: 1024,
            max_simultaneous_bytes: 8 * 1024 * 1024 * 1024,
        }
    }
}

/// Handle to the multiplexed fetch gateway. Cheap to clone (an `Arc`
/// underneath); every clone shares the same reactor thread and admission
/// state.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

static SINGLETON: OnceLock<Mutex<Weak<Inner>>> = OnceLock::new();

impl Gateway {
    /// Process-wide singleton accessor, mirroring the weak-pointer pattern
    /// used to hand out one shared instance per process: if a gateway is
    /// already alive, it is returned regardless of `limits`; only when none
    /// is alive is a fresh one constructed with the given limits.
    pub fn make(limits: GatewayLimits) -> Gateway {
        let slot = SINGLETON.get_or_init(|| Mutex::new(Weak::new()));
        let mut guard = slot.lock().unwrap();
        if let Some(inner) = guard.upgrade() {
            return Gateway { inner };
        }
        let gateway = Self::build(limits);
        *guard = Arc::downgrade(&gateway.inner);
        gateway
    }

    /// A gateway independent of the process singleton, for tests that need
    /// several gateways alive at once with different limits.
    pub fn standalone(limits: GatewayLimits) -> Gateway {
        Self::build(limits)
    }

    fn build(limits: GatewayLimits) -> Gateway {
        let reactor = Arc::new(ReactorShared::new(
            limits.max_in_flight_count,
            limits.max_simultaneous_bytes,
        ));
        crate::metrics::Counters::set_max_in_flight(limits.max_in_flight_count);
        crate::metrics::Counters::set_max_allocated_bytes(limits.max_simultaneous_bytes);
        let thread = reactor::spawn(reactor.clone());
        let inner = Arc::new(Inner {
            reactor,
            reactor_thread: Mutex::new(Some(thread)),
        });
        Gateway { inner }
    }

    fn reject_oversized(&self, expected_size: u64) -> Option<GatewayError> {
        if expected_size > self.inner.reactor.max_simultaneous_bytes {
            Some(GatewayError::AdmissionRejected {
                expected_size,
                limit: self.inner.reactor.max_simultaneous_bytes,
            })
        } else {
            None
        }
    }

    /// Submit a buffered transfer. `callback` is invoked exactly once, with
    /// the assembled body on success or the accumulated errors on failure.
    /// A request whose key matches one already in flight piggy-backs on it:
    /// `callback` is simply attached as an additional subscriber and no new
    /// HTTP request is made.
    #[allow(clippy::too_many_arguments)]
    pub fn download_buffered(
        &self,
        url: String,
        offset: u64,
        headers: Vec<(String, String)>,
        body: Option<Bytes>,
        expected_size: u64,
        policy: Arc<dyn RetryPolicy>,
        callback: ResultCallback,
    ) {
        crate::metrics::Counters::request_submitted();
        if let Some(err) = self.reject_oversized(expected_size) {
            callback(Err(ErrorList::single(err)));
            return;
        }

        let key = RequestKey::new(url.clone(), offset, headers.clone(), body.clone(), policy.clone());
        let mut state = self.inner.reactor.state.lock().unwrap();

        if let Some(existing) = state.coalescing.lookup(&key) {
            if existing.add_callback(callback) {
                crate::metrics::Counters::set_straight_in_flight(state.coalescing.len());
                return;
            }
            // The existing transfer settled between lookup and attach; fall
            // through and start a fresh one in its place.
        }

        let transfer = Transfer::new_buffered(url, offset, headers, body, expected_size, callback);
        state.coalescing.insert(key, &transfer);
        state
            .retry_tracker
            .insert(TransferId::of(&transfer), policy.new_state());
        crate::metrics::Counters::set_straight_in_flight(state.coalescing.len());

        state.queue.push_back(transfer);
        crate::metrics::Counters::set_await_queue_depth(state.queue.len());
        self.inner.reactor.maybe_wake(&state, expected_size);
    }

    /// Submit a streaming transfer. Never coalesced: `on_chunk` is called
    /// once per received chunk in arrival order, then `on_finish` exactly
    /// once. Streaming transfers are never retried.
    ///
    /// A streaming transfer has no declared content length to admit against,
    /// so it is weighed at a fixed `STREAM_ADMISSION_WEIGHT_BYTES` instead of
    /// a caller-supplied size.
    pub fn download_stream(
        &self,
        url: String,
        offset: u64,
        headers: Vec<(String, String)>,
        on_chunk: OnChunk,
        on_finish: OnFinish,
    ) {
        crate::metrics::Counters::request_submitted();
        let expected_size = STREAM_ADMISSION_WEIGHT_BYTES;
        if let Some(err) = self.reject_oversized(expected_size) {
            on_finish(Some(ErrorList::single(err)));
            return;
        }

        let transfer = Transfer::new_streaming(url, offset, headers, expected_size, on_chunk, on_finish);
        let mut state = self.inner.reactor.state.lock().unwrap();
        state.queue.push_back(transfer);
        crate::metrics::Counters::set_await_queue_depth(state.queue.len());
        self.inner.reactor.maybe_wake(&state, expected_size);
    }
}

/// Admission weight assigned to every streaming transfer, in lieu of a
/// caller-declared content length: 16 write-buffers at the transport layer's
/// chunk size.
const STREAM_ADMISSION_WEIGHT_BYTES: u64 = 16 * crate::transport::READ_CHUNK_SIZE as u64;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::NeverRetry;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn oversized_request_rejected_synchronously() {
        let gateway = Gateway::standalone(GatewayLimits {
            max_in_flight_count: 4,
            max_simultaneous_bytes: 100,
        });
        let got = Arc::new(Mutex::new(None));
        let got2 = got.clone();
        gateway.download_buffered(
            "https://example.invalid/x".into(),
            0,
            vec![],
            None,
            1_000,
            Arc::new(NeverRetry),
            Box::new(move |res| *got2.lock().unwrap() = Some(res)),
        );
        let result = got.lock().unwrap().take().expect("callback fired synchronously");
        assert!(result.is_err());
    }

    #[test]
    fn identical_requests_coalesce_into_one_logical_transfer() {
        let gateway = Gateway::standalone(GatewayLimits::default());
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let fired2 = fired.clone();
            gateway.download_buffered(
                "https://example.invalid/coalesce".into(),
                0,
                vec![],
                None,
                10,
                Arc::new(NeverRetry),
                Box::new(move |_| {
                    fired2.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        // Three identical submissions share one coalescing-index entry and
        // therefore one underlying transfer, regardless of how quickly the
        // reactor thread picks it up.
        let state = gateway.inner.reactor.state.lock().unwrap();
        assert_eq!(state.coalescing.len(), 1);
    }
}
