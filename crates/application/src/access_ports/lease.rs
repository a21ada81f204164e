use async_trait::async_trait;
use grantkeeper_core::AppResult;

/// Lease held by one worker for one reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerLease {
    /// Lease scope, one per reconciler.
    pub scope_key: String,
    /// Compare-and-delete token.
    pub token: String,
    /// Worker holding the lease.
    pub holder_id: String,
}

/// Distributed coordination port so only one replica runs a cycle at a time.
#[async_trait]
pub trait ReconcilerLeaseCoordinator: Send + Sync {
    /// Attempts to acquire one lease for the given scope.
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<ReconcilerLease>>;

    /// Releases one lease using token compare-and-delete semantics.
    async fn release_lease(&self, lease: &ReconcilerLease) -> AppResult<()>;
}
