//! Distributed lock manager seam.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BoxError;

/// Acquires time-bounded exclusive holds on named locks. Acquisition is per
/// (group, name) pair; the holder id identifies one execution call.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Attempt to acquire a lease. `None` when the lock is held elsewhere
    /// and could not be obtained within the manager's bounded wait.
    async fn attempt_acquire(
        &self,
        group: &str,
        name: &str,
        holder: &str,
        lease_time: Duration,
        blocking: bool,
    ) -> Result<Option<Arc<dyn LockLease>>, BoxError>;
}

/// A held lease on a distributed lock.
#[async_trait]
pub trait LockLease: Send + Sync {
    /// Extend the lease by `extension`.
    async fn renew(&self, extension: Duration) -> Result<bool, BoxError>;

    /// Release the lease. `requeue` asks the manager to hand the lock to the
    /// next waiter rather than retiring the entry.
    async fn release(&self, requeue: bool) -> Result<(), BoxError>;
}
