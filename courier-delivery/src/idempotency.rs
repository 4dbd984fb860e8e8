//! Duplicate suppression for caller-keyed requests
//!
//! Sits outside the [`Dispatcher`]: requests carrying a `request_id` are
//! admitted once per TTL window. An id is released again when its request
//! ends without delivery, so the caller can retry a failed send under the
//! same key. Requests without an id always pass through.
//!
//! # Memory Behavior
//!
//! Expired ids are swept every `cleanup_interval` checks, so the map may
//! hold stale entries between sweeps.

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use ahash::AHashMap;
use courier_common::internal;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    dispatcher::Dispatcher, error::DeliveryError, message::SendRequest, outcome::DeliveryOutcome,
};

/// Time-windowed set of admitted request ids
#[derive(Debug)]
pub struct IdempotencyGuard {
    /// id -> admission time
    seen: Mutex<AHashMap<String, Instant>>,
    ttl: Duration,
    ops_since_cleanup: AtomicU32,
    cleanup_interval: u32,
}

impl IdempotencyGuard {
    /// Create a guard remembering ids for `ttl`, sweeping every 1000 checks.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_cleanup_interval(ttl, 1000)
    }

    /// Create a guard with a custom sweep interval (minimum 1).
    #[must_use]
    pub fn with_cleanup_interval(ttl: Duration, cleanup_interval: u32) -> Self {
        Self {
            seen: Mutex::new(AHashMap::new()),
            ttl,
            ops_since_cleanup: AtomicU32::new(0),
            cleanup_interval: cleanup_interval.max(1),
        }
    }

    /// Admit `id` if it has not been admitted within the TTL window.
    ///
    /// Returns `true` for a new id, `false` for a duplicate.
    pub fn check(&self, id: &str) -> bool {
        let now = Instant::now();

        let ops = self.ops_since_cleanup.fetch_add(1, Ordering::Relaxed);
        if ops >= self.cleanup_interval {
            self.ops_since_cleanup.store(0, Ordering::Relaxed);
            self.cleanup(now);
        }

        let mut seen = self.seen.lock();

        if let Some(admitted) = seen.get(id)
            && now.duration_since(*admitted) < self.ttl
        {
            return false;
        }

        seen.insert(id.to_string(), now);
        true
    }

    /// Forget `id` so a later request may use it again.
    pub fn release(&self, id: &str) {
        self.seen.lock().remove(id);
    }

    fn cleanup(&self, now: Instant) {
        let mut seen = self.seen.lock();
        seen.retain(|_, admitted| now.duration_since(*admitted) < self.ttl);
    }

    /// Number of ids currently tracked (snapshot).
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

/// An admitted id, released on drop unless the request was delivered.
///
/// Covers sends that are dropped before completing as well as ones that end
/// without delivery.
struct Admission<'a> {
    guard: &'a IdempotencyGuard,
    id: &'a str,
    armed: bool,
}

impl Admission<'_> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.guard.release(self.id);
        }
    }
}

/// A [`Dispatcher`] fronted by an [`IdempotencyGuard`]
#[derive(Debug)]
pub struct IdempotentDispatcher {
    inner: Dispatcher,
    guard: IdempotencyGuard,
}

impl IdempotentDispatcher {
    #[must_use]
    pub fn new(inner: Dispatcher, ttl: Duration) -> Self {
        Self {
            inner,
            guard: IdempotencyGuard::new(ttl),
        }
    }

    #[must_use]
    pub const fn guard(&self) -> &IdempotencyGuard {
        &self.guard
    }

    /// # Errors
    ///
    /// Returns [`DeliveryError::Duplicate`] for a repeated request id, or any
    /// error from [`Dispatcher::send`].
    pub async fn send(&self, request: &SendRequest) -> Result<DeliveryOutcome, DeliveryError> {
        self.send_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// # Errors
    ///
    /// Returns [`DeliveryError::Duplicate`] for a repeated request id, or any
    /// error from [`Dispatcher::send_with_cancellation`].
    pub async fn send_with_cancellation(
        &self,
        request: &SendRequest,
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let Some(id) = request.request_id.as_deref() else {
            return self.inner.send_with_cancellation(request, cancel).await;
        };

        if !self.guard.check(id) {
            internal!(level = DEBUG, request_id = %id, "Duplicate request suppressed");
            return Err(DeliveryError::Duplicate(id.to_string()));
        }

        let admission = Admission {
            guard: &self.guard,
            id,
            armed: true,
        };

        let result = self.inner.send_with_cancellation(request, cancel).await;

        if result.as_ref().is_ok_and(DeliveryOutcome::succeeded) {
            admission.keep();
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_id_passes() {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        assert!(guard.check("req-1"));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        assert!(guard.check("req-1"));
        assert!(!guard.check("req-1"));
    }

    #[test]
    fn test_different_ids_pass() {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        assert!(guard.check("req-1"));
        assert!(guard.check("req-2"));
    }

    #[test]
    fn test_released_id_passes_again() {
        let guard = IdempotencyGuard::new(Duration::from_secs(60));
        assert!(guard.check("req-1"));
        guard.release("req-1");
        assert!(guard.is_empty());
        assert!(guard.check("req-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_id_passes_again() {
        let guard = IdempotencyGuard::new(Duration::from_secs(10));
        assert!(guard.check("req-1"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(guard.check("req-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_sweeps_expired_ids() {
        let guard = IdempotencyGuard::with_cleanup_interval(Duration::from_secs(10), 2);
        assert!(guard.check("old-1"));
        assert!(guard.check("old-2"));

        tokio::time::advance(Duration::from_secs(11)).await;

        // Third check triggers the sweep before recording the new id
        assert!(guard.check("new"));
        assert_eq!(guard.len(), 1);
    }
}
