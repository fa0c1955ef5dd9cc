//! Retry policy contract consumed by the gateway.
//!
//! The generic retry-policy library itself is out of scope for this crate;
//! this module defines the narrow interface the gateway consumes and ships a
//! couple of concrete policies, modeled on a circuit breaker's per-key state
//! objects, so the crate is usable and testable standalone.

use std::time::Duration;

/// What the reactor observed for one completed attempt.
#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    /// The HTTP response was received, including non-2xx — the gateway never
    /// classifies success vs failure itself, that judgment belongs entirely
    /// to the policy.
    Response(u16),
    /// The transfer failed at the transport layer before a response code was
    /// available.
    TransportError,
}

/// Per-logical-request retry state, obtained once via [`RetryPolicy::new_state`]
/// and consulted once per completion.
pub trait RetryState: Send {
    /// `Some(d)`: retry after `d`. `None`: give up, deliver the result as-is.
    fn next_delay(&mut self, outcome: Outcome) -> Option<Duration>;
}

/// A retry policy. Participates in request-key identity by reference — two
/// `download_buffered` calls using distinct `Arc<dyn RetryPolicy>` instances
/// are never coalesced even if otherwise identical.
pub trait RetryPolicy: Send + Sync {
    fn new_state(&self) -> Box<dyn RetryState>;
}

/// Never retries — every completion is delivered immediately.
pub struct NeverRetry;

struct NeverRetryState;

impl RetryState for NeverRetryState {
    fn next_delay(&mut self, _outcome: Outcome) -> Option<Duration> {
        None
    }
}

impl RetryPolicy for NeverRetry {
    fn new_state(&self) -> Box<dyn RetryState> {
        Box::new(NeverRetryState)
    }
}

/// Retries a fixed, explicit sequence of delays whenever the response code is
/// in `retry_on_codes` or the attempt failed at the transport layer, then
/// gives up. Useful for tests and as a template for real policies.
pub struct FixedSequenceRetry {
    delays: Vec<Duration>,
    retry_on_codes: Vec<u16>,
}

impl FixedSequenceRetry {
    pub fn new(delays: Vec<Duration>, retry_on_codes: Vec<u16>) -> Self {
        Self {
            delays,
            retry_on_codes,
        }
    }
}

struct FixedSequenceRetryState {
    remaining: std::vec::IntoIter<Duration>,
    retry_on_codes: Vec<u16>,
}

impl RetryState for FixedSequenceRetryState {
    fn next_delay(&mut self, outcome: Outcome) -> Option<Duration> {
        let should_retry = match outcome {
            Outcome::TransportError => true,
            Outcome::Response(code) => self.retry_on_codes.contains(&code),
        };
        if !should_retry {
            return None;
        }
        self.remaining.next()
    }
}

impl RetryPolicy for FixedSequenceRetry {
    fn new_state(&self) -> Box<dyn RetryState> {
        Box::new(FixedSequenceRetryState {
            remaining: self.delays.clone().into_iter(),
            retry_on_codes: self.retry_on_codes.clone(),
        })
    }
}
