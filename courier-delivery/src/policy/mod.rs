//! Policy abstractions for dispatch operations.
//!
//! - [`RetryPolicy`]: attempt limit and backoff timing

pub mod retry;

pub use retry::RetryPolicy;
