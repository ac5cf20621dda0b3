//! Retry subsystem: eligibility, backoff and the bounded attempt loop.
//!
//! A [`RetryPolicy`] is built once per step from the workflow's declarative
//! configuration and consumed by [`with_retry`]. Observers receive
//! before/retry/success/failure notifications for every attempt.

pub mod executor;
pub mod matcher;
pub mod observer;
pub mod policy;
pub mod strategy;

pub use executor::with_retry;
pub use matcher::ErrorMatcher;
pub use observer::{RetryObserver, TracingObserver};
pub use policy::RetryPolicy;
pub use strategy::BackoffStrategy;
