use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grantkeeper_core::AppResult;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::access_ports::ReconcilerLeaseCoordinator;
use crate::reconcile_metrics::record_cycle;

/// One periodically repeated reconciliation pass.
#[async_trait]
pub trait ReconciliationCycle: Send + Sync {
    /// Stable name used for logs, metrics and the lease scope.
    fn name(&self) -> &'static str;

    /// Runs one full pass. Per-entity failures are handled inside; an error
    /// means the pass could not run at all.
    async fn run_cycle(&self) -> AppResult<()>;
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cycle ran to completion.
    Completed,
    /// The cycle returned an error.
    Failed,
    /// Another replica holds the lease or the lease could not be acquired.
    Skipped,
}

impl CycleOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Clone)]
struct LeaseSettings {
    coordinator: Arc<dyn ReconcilerLeaseCoordinator>,
    holder_id: String,
    lease_seconds: u32,
}

/// Ticker that runs one reconciler until shutdown.
#[derive(Clone)]
pub struct ReconcilerLoop {
    cycle: Arc<dyn ReconciliationCycle>,
    interval: Duration,
    lease: Option<LeaseSettings>,
}

impl ReconcilerLoop {
    /// Creates a loop running `cycle` every `interval`.
    #[must_use]
    pub fn new(cycle: Arc<dyn ReconciliationCycle>, interval: Duration) -> Self {
        Self {
            cycle,
            interval,
            lease: None,
        }
    }

    /// Gates every cycle on a `reconciler:<name>` lease.
    #[must_use]
    pub fn with_lease_coordinator(
        mut self,
        coordinator: Arc<dyn ReconcilerLeaseCoordinator>,
        holder_id: impl Into<String>,
        lease_seconds: u32,
    ) -> Self {
        self.lease = Some(LeaseSettings {
            coordinator,
            holder_id: holder_id.into(),
            lease_seconds,
        });
        self
    }

    /// Runs one cycle now and then on every tick until `shutdown` resolves.
    ///
    /// Shutdown is observed only while waiting for the next tick; a running
    /// cycle always completes.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            reconciler = self.cycle.name(),
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "reconciler loop started"
        );

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }

        info!(reconciler = self.cycle.name(), "reconciler loop stopped");
    }

    /// Runs a single cycle, honouring the lease when one is configured.
    pub async fn run_once(&self) -> CycleOutcome {
        let name = self.cycle.name();
        let outcome = match &self.lease {
            None => self.run_cycle().await,
            Some(settings) => {
                let scope_key = format!("reconciler:{name}");
                match settings
                    .coordinator
                    .try_acquire_lease(
                        scope_key.as_str(),
                        settings.holder_id.as_str(),
                        settings.lease_seconds,
                    )
                    .await
                {
                    Ok(Some(lease)) => {
                        let outcome = self.run_cycle().await;
                        if let Err(error) = settings.coordinator.release_lease(&lease).await {
                            warn!(reconciler = name, error = %error, "failed to release reconciler lease");
                        }
                        outcome
                    }
                    Ok(None) => {
                        debug!(reconciler = name, "lease held by another worker; skipping cycle");
                        CycleOutcome::Skipped
                    }
                    Err(error) => {
                        warn!(reconciler = name, error = %error, "failed to acquire reconciler lease");
                        CycleOutcome::Skipped
                    }
                }
            }
        };

        record_cycle(name, outcome.as_str());
        outcome
    }

    async fn run_cycle(&self) -> CycleOutcome {
        match self.cycle.run_cycle().await {
            Ok(()) => CycleOutcome::Completed,
            Err(error) => {
                warn!(reconciler = self.cycle.name(), error = %error, "reconciliation cycle failed");
                CycleOutcome::Failed
            }
        }
    }
}
