//! Owning byte buffer whose lifetime drives the global `output_bytes` gauge.
//! Construction/clone increments, drop/`extract` decrements. Adjusted here —
//! not in the reactor — so responses the caller holds onto but never reads
//! still count against the memory budget.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};

static OUTPUT_BYTES: AtomicU64 = AtomicU64::new(0);

/// Current sum of `Content::len()` over every live `Content` value.
pub fn output_bytes() -> u64 {
    OUTPUT_BYTES.load(Ordering::Relaxed)
}

fn track(len: usize) {
    if len == 0 {
        return;
    }
    let new_total = OUTPUT_BYTES.fetch_add(len as u64, Ordering::Relaxed) + len as u64;
    metrics::gauge!("fetch_gateway_output_bytes").set(new_total as f64);
}

fn untrack(len: usize) {
    if len == 0 {
        return;
    }
    let new_total = OUTPUT_BYTES.fetch_sub(len as u64, Ordering::Relaxed) - len as u64;
    metrics::gauge!("fetch_gateway_output_bytes").set(new_total as f64);
}

/// A completed response body, optionally tagged with the HTTP response code
/// (buffered transfers) or untagged (streaming chunks).
pub struct Content {
    data: Bytes,
    response_code: Option<u16>,
}

impl Content {
    pub fn new(data: Bytes, response_code: Option<u16>) -> Self {
        track(data.len());
        Self {
            data,
            response_code,
        }
    }

    /// Construct an untagged chunk, as delivered to `on_chunk`.
    pub fn chunk(data: Bytes) -> Self {
        Self::new(data, None)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn http_response_code(&self) -> Option<u16> {
        self.response_code
    }

    /// Move the bytes out, decrementing the gauge immediately rather than at
    /// drop time. The `Content` is left empty and its `Drop` impl becomes a
    /// no-op (it only subtracts a non-zero length).
    pub fn extract(mut self) -> Bytes {
        untrack(self.data.len());
        std::mem::take(&mut self.data)
    }
}

impl Clone for Content {
    fn clone(&self) -> Self {
        track(self.data.len());
        Self {
            data: self.data.clone(),
            response_code: self.response_code,
        }
    }
}

impl Drop for Content {
    fn drop(&mut self) {
        untrack(self.data.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_increments_gauge() {
        let before = output_bytes();
        let c = Content::new(Bytes::from_static(b"HELLO"), Some(200));
        assert_eq!(output_bytes(), before + 5);
        drop(c);
        assert_eq!(output_bytes(), before);
    }

    #[test]
    fn clone_increments_independently() {
        let before = output_bytes();
        let c1 = Content::new(Bytes::from_static(b"ABCDE"), Some(200));
        let c2 = c1.clone();
        assert_eq!(output_bytes(), before + 10);
        assert_eq!(c1.as_bytes(), c2.as_bytes());
        drop(c1);
        assert_eq!(output_bytes(), before + 5);
        drop(c2);
        assert_eq!(output_bytes(), before);
    }

    #[test]
    fn extract_decrements_once() {
        let before = output_bytes();
        let c = Content::new(Bytes::from_static(b"ABC"), Some(200));
        let bytes = c.extract();
        assert_eq!(&bytes[..], b"ABC");
        assert_eq!(output_bytes(), before);
    }
}
