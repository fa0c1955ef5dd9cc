//! Transfer handle: one in-flight HTTP operation, its buffer, and its
//! completion callbacks.

use crate::content::Content;
use crate::error::{ErrorList, GatewayError};
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub type ResultCallback = Box<dyn FnOnce(Result<Content, ErrorList>) + Send>;
pub type OnChunk = Box<dyn FnMut(Content) + Send>;
pub type OnFinish = Box<dyn FnOnce(Option<ErrorList>) + Send>;

/// Identity of a transfer, stable for as long as the `Arc<Transfer>` that
/// produced it is alive. Used as the key into the reactor's active set and
/// the retry tracker — a pointer-identity stand-in for keying by a raw
/// connection-handle pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(usize);

impl TransferId {
    pub fn of(transfer: &Arc<Transfer>) -> Self {
        Self(Arc::as_ptr(transfer) as *const () as usize)
    }
}

enum TransferMode {
    Buffered {
        buffer: Mutex<BytesMut>,
        callbacks: Mutex<Vec<ResultCallback>>,
    },
    Streaming {
        on_chunk: Mutex<OnChunk>,
        on_finish: Mutex<Option<OnFinish>>,
    },
}

pub struct Transfer {
    pub url: String,
    pub offset: u64,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub expected_size: u64,
    mode: TransferMode,
    body_cursor: Mutex<usize>,
    /// Monotonically increasing attempt counter, bumped once per reactor
    /// admission. Exists only for diagnostics/logging.
    pub(crate) attempt: AtomicU64,
}

impl Transfer {
    pub fn new_buffered(
        url: String,
        offset: u64,
        headers: Vec<(String, String)>,
        body: Option<Bytes>,
        expected_size: u64,
        first_callback: ResultCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            url,
            offset,
            headers,
            body,
            expected_size,
            mode: TransferMode::Buffered {
                buffer: Mutex::new(BytesMut::new()),
                callbacks: Mutex::new(vec![first_callback]),
            },
            body_cursor: Mutex::new(0),
            attempt: AtomicU64::new(0),
        })
    }

    pub fn new_streaming(
        url: String,
        offset: u64,
        headers: Vec<(String, String)>,
        expected_size: u64,
        on_chunk: OnChunk,
        on_finish: OnFinish,
    ) -> Arc<Self> {
        Arc::new(Self {
            url,
            offset,
            headers,
            body: None,
            expected_size,
            mode: TransferMode::Streaming {
                on_chunk: Mutex::new(on_chunk),
                on_finish: Mutex::new(Some(on_finish)),
            },
            body_cursor: Mutex::new(0),
            attempt: AtomicU64::new(0),
        })
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.mode, TransferMode::Streaming { .. })
    }

    /// Attach another subscriber while a caller thread still considers the
    /// transfer live. If the completion set is already empty, refuse — the
    /// caller must start a fresh transfer. Streaming transfers always refuse.
    pub fn add_callback(&self, cb: ResultCallback) -> bool {
        match &self.mode {
            TransferMode::Buffered { callbacks, .. } => {
                let mut cbs = callbacks.lock().unwrap();
                if cbs.is_empty() {
                    return false;
                }
                cbs.push(cb);
                true
            }
            TransferMode::Streaming { .. } => false,
        }
    }

    /// Drain the completion set, delivering `error` to every subscriber.
    /// Idempotent: a second call finds an empty set and does nothing.
    pub fn fail(&self, error: GatewayError) {
        match &self.mode {
            TransferMode::Buffered { callbacks, .. } => {
                let drained: Vec<ResultCallback> = {
                    let mut cbs = callbacks.lock().unwrap();
                    cbs.drain(..).collect()
                };
                let issues = ErrorList::single(error);
                // LIFO: the most recently attached subscriber is notified first.
                for cb in drained.into_iter().rev() {
                    cb(Err(issues.clone()));
                }
            }
            TransferMode::Streaming { on_finish, .. } => {
                if let Some(f) = on_finish.lock().unwrap().take() {
                    f(Some(ErrorList::single(error)));
                }
            }
        }
    }

    /// Successful completion: deliver the accumulated buffer (or, for
    /// streaming, signal end-of-stream) with the observed HTTP response code.
    pub fn done(&self, response_code: u16) {
        match &self.mode {
            TransferMode::Buffered { buffer, callbacks } => {
                let drained: Vec<ResultCallback> = {
                    let mut cbs = callbacks.lock().unwrap();
                    cbs.drain(..).collect()
                };
                let data = buffer.lock().unwrap().clone().freeze();
                // `Bytes::clone` is a refcount bump, not a copy, so every
                // subscriber gets an independent `Content` over shared
                // storage, with no special-cased "move the last one" path.
                for cb in drained.into_iter().rev() {
                    cb(Ok(Content::new(data.clone(), Some(response_code))));
                }
            }
            TransferMode::Streaming { on_finish, .. } => {
                if let Some(f) = on_finish.lock().unwrap().take() {
                    f(None);
                }
            }
        }
    }

    /// On-data callback from the transport layer. Buffered: append. Streaming:
    /// forward immediately as a chunk. Never truncates — `expected_size`
    /// governs admission only, not how much is actually written.
    pub fn write(&self, bytes: &[u8]) -> usize {
        match &self.mode {
            TransferMode::Buffered { buffer, .. } => {
                buffer.lock().unwrap().extend_from_slice(bytes);
                bytes.len()
            }
            TransferMode::Streaming { on_chunk, .. } => {
                let mut cb = on_chunk.lock().unwrap();
                cb(Content::chunk(Bytes::copy_from_slice(bytes)));
                bytes.len()
            }
        }
    }

    /// On-data request from the transport layer for the request body cursor.
    /// Returns an empty slice once the body is exhausted.
    pub fn read(&self, capacity: usize) -> Bytes {
        let Some(body) = &self.body else {
            return Bytes::new();
        };
        let mut cursor = self.body_cursor.lock().unwrap();
        if *cursor >= body.len() {
            return Bytes::new();
        }
        let end = (*cursor + capacity).min(body.len());
        let chunk = body.slice(*cursor..end);
        *cursor = end;
        chunk
    }

    /// Clears accumulated state before a (re)attempt. A transfer admitted for
    /// the first time has nothing to clear; a retried transfer must not
    /// carry over bytes written by the failed attempt, since accumulating a
    /// failed attempt's partial body alongside a successful one would
    /// corrupt the delivered content.
    pub fn reset_for_retry(&self) {
        if let TransferMode::Buffered { buffer, .. } = &self.mode {
            buffer.lock().unwrap().clear();
        }
        *self.body_cursor.lock().unwrap() = 0;
        self.attempt.fetch_add(1, Ordering::Relaxed);
    }

    /// `true` once the completion set has been fully drained by a prior
    /// `fail`/`done` — a new piggy-backer must start a fresh transfer.
    pub fn is_settled(&self) -> bool {
        match &self.mode {
            TransferMode::Buffered { callbacks, .. } => callbacks.lock().unwrap().is_empty(),
            TransferMode::Streaming { on_finish, .. } => on_finish.lock().unwrap().is_none(),
        }
    }
}

/// A transfer dropped with unsettled callbacks — because its owning retry
/// timer was dropped, or because the admission queue holding it was torn
/// down on shutdown — delivers a synthetic cancellation to every subscriber
/// still attached. `fail` is idempotent, so a transfer dropped after an
/// already-delivered `done`/`fail` is a silent no-op here.
impl Drop for Transfer {
    fn drop(&mut self) {
        self.fail(GatewayError::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_callback(counter: Arc<AtomicUsize>, order: Arc<Mutex<Vec<usize>>>, tag: usize) -> ResultCallback {
        Box::new(move |_result| {
            counter.fetch_add(1, Ordering::SeqCst);
            order.lock().unwrap().push(tag);
        })
    }

    #[test]
    fn add_callback_refused_once_settled() {
        let t = Transfer::new_buffered(
            "https://h/x".into(),
            0,
            vec![],
            None,
            10,
            Box::new(|_| {}),
        );
        assert!(t.add_callback(Box::new(|_| {})));
        t.done(200);
        assert!(!t.add_callback(Box::new(|_| {})));
    }

    #[test]
    fn done_fires_callbacks_in_lifo_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));
        let t = Transfer::new_buffered(
            "https://h/x".into(),
            0,
            vec![],
            None,
            10,
            counting_callback(counter.clone(), order.clone(), 0),
        );
        assert!(t.add_callback(counting_callback(counter.clone(), order.clone(), 1)));
        assert!(t.add_callback(counting_callback(counter.clone(), order.clone(), 2)));

        t.write(b"HELLO");
        t.done(200);

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn all_subscribers_see_identical_bytes() {
        let results = Arc::new(Mutex::new(Vec::new()));
        let r1 = results.clone();
        let r2 = results.clone();
        let t = Transfer::new_buffered(
            "https://h/x".into(),
            0,
            vec![],
            None,
            10,
            Box::new(move |res| {
                r1.lock().unwrap().push(res.unwrap().as_bytes().to_vec());
            }),
        );
        t.add_callback(Box::new(move |res| {
            r2.lock().unwrap().push(res.unwrap().as_bytes().to_vec());
        }));
        t.write(b"HELLO");
        t.done(200);

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], b"HELLO");
        assert_eq!(results[1], b"HELLO");
    }

    #[test]
    fn fail_is_idempotent() {
        let t = Transfer::new_buffered("https://h/x".into(), 0, vec![], None, 10, Box::new(|_| {}));
        t.fail(GatewayError::Transport("boom".into()));
        // Second call finds an empty set; must not panic or double-invoke.
        t.fail(GatewayError::Transport("boom again".into()));
    }

    #[test]
    fn read_exhausts_body_then_returns_empty() {
        let t = Transfer::new_buffered(
            "https://h/x".into(),
            0,
            vec![],
            Some(Bytes::from_static(b"0123456789")),
            10,
            Box::new(|_| {}),
        );
        assert_eq!(&t.read(4)[..], b"0123");
        assert_eq!(&t.read(4)[..], b"4567");
        assert_eq!(&t.read(4)[..], b"89");
        assert_eq!(t.read(4).len(), 0);
    }

    #[test]
    fn reset_for_retry_clears_buffer_and_cursor() {
        let t = Transfer::new_buffered(
            "https://h/x".into(),
            0,
            vec![],
            Some(Bytes::from_static(b"abc")),
            10,
            Box::new(|_| {}),
        );
        t.write(b"partial");
        let _ = t.read(2);
        t.reset_for_retry();
        assert_eq!(&t.read(3)[..], b"abc");
    }

    #[test]
    fn streaming_chunks_then_finish() {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let c2 = chunks.clone();
        let finished = Arc::new(AtomicUsize::new(0));
        let f2 = finished.clone();
        let t = Transfer::new_streaming(
            "https://h/big".into(),
            0,
            vec![],
            1024,
            Box::new(move |content| c2.lock().unwrap().push(content.as_bytes().to_vec())),
            Box::new(move |err| {
                assert!(err.is_none());
                f2.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(!t.add_callback(Box::new(|_| {})));
        t.write(b"ABC");
        t.write(b"DEF");
        t.done(200);
        assert_eq!(*chunks.lock().unwrap(), vec![b"ABC".to_vec(), b"DEF".to_vec()]);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
