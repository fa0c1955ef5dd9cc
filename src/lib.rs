//! A multiplexed HTTP fetch gateway: one reactor thread drives an arbitrary
//! number of in-flight transfers through a shared admission budget, with
//! request coalescing, pluggable retry policies, and buffered or streaming
//! delivery.

pub mod coalesce;
pub mod config;
pub mod content;
pub mod error;
pub mod gateway;
pub mod key;
pub mod metrics;
pub mod queue;
mod reactor;
pub mod retry;
pub mod retry_tracker;
pub mod scheduler;
pub mod server;
pub mod transfer;
mod transport;

pub use content::Content;
pub use error::{ErrorList, GatewayError};
pub use gateway::{Gateway, GatewayLimits};
pub use retry::{FixedSequenceRetry, NeverRetry, Outcome, RetryPolicy, RetryState};
pub use scheduler::{TaskScheduler, TokioTaskScheduler};
pub use transfer::{OnChunk, OnFinish, ResultCallback, Transfer, TransferId};
