use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grantkeeper_core::{AppError, AppResult};
use grantkeeper_domain::{
    Access, AccessAuditAction, BigQueryDatasource, RECONCILER_ACTOR, Subject,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::access_ports::{AccessAuditEvent, AccessRepositories, GrantBackend};
use crate::reconcile_metrics::record_reconciler_failure;
use crate::reconciler_loop::ReconciliationCycle;

const RECONCILER_NAME: &str = "access";

/// Counts from one access reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessReconcileReport {
    /// Unrevoked rows found past their expiry.
    pub expired: usize,
    /// Expired rows revoked in IAM and in the store.
    pub revoked: usize,
    /// Active rows compared against IAM.
    pub drift_checked: usize,
    /// Active rows re-granted because IAM lacked them.
    pub drift_repaired: usize,
    /// Entries skipped because of an error.
    pub failures: usize,
}

/// Revokes expired grants and re-asserts active grants missing in IAM.
#[derive(Clone)]
pub struct AccessReconciler {
    repositories: AccessRepositories,
    grant_backend: Arc<dyn GrantBackend>,
    drift_check_enabled: bool,
}

impl AccessReconciler {
    /// Creates an access reconciler with the drift check enabled.
    #[must_use]
    pub fn new(repositories: AccessRepositories, grant_backend: Arc<dyn GrantBackend>) -> Self {
        Self {
            repositories,
            grant_backend,
            drift_check_enabled: true,
        }
    }

    /// Toggles the IAM drift check.
    #[must_use]
    pub fn with_drift_check(mut self, enabled: bool) -> Self {
        self.drift_check_enabled = enabled;
        self
    }

    /// Runs one cycle as of `now`.
    ///
    /// Only failing to list rows aborts the cycle; every per-row error is
    /// logged, counted and retried on the next cycle.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> AppResult<AccessReconcileReport> {
        let mut report = AccessReconcileReport::default();
        let mut datasources = DatasourceCache::default();

        let expired = self
            .repositories
            .access
            .list_unrevoked_expired_access(now)
            .await?;
        report.expired = expired.len();
        for access in &expired {
            match self.revoke_expired(access, &mut datasources).await {
                Ok(()) => report.revoked += 1,
                Err(operation) => {
                    report.failures += 1;
                    record_reconciler_failure(RECONCILER_NAME, operation);
                }
            }
        }

        if self.drift_check_enabled {
            let active = self.repositories.access.list_active_access(now).await?;
            for access in &active {
                report.drift_checked += 1;
                match self.repair_drift(access, &mut datasources).await {
                    Ok(repaired) => report.drift_repaired += usize::from(repaired),
                    Err(operation) => {
                        report.failures += 1;
                        record_reconciler_failure(RECONCILER_NAME, operation);
                    }
                }
            }
        }

        Ok(report)
    }

    async fn revoke_expired(
        &self,
        access: &Access,
        datasources: &mut DatasourceCache,
    ) -> Result<(), &'static str> {
        let datasource = datasources
            .primary(self, access)
            .await
            .map_err(|error| log_failure(access, "GetBigqueryDatasource", &error))?;
        let subject = access
            .parsed_subject()
            .map_err(|error| log_failure(access, "ParseSubject", &error))?;

        self.grant_backend
            .revoke(&datasource.coordinates, &subject)
            .await
            .map_err(|error| log_failure(access, "Revoke", &error))?;
        self.repositories
            .access
            .revoke_access(access.id)
            .await
            .map_err(|error| log_failure(access, "SetAccessRevoked", &error))?;

        self.append_audit(access, AccessAuditAction::AccessRevoked, "expired")
            .await;
        Ok(())
    }

    /// Returns whether a grant had to be re-issued.
    async fn repair_drift(
        &self,
        access: &Access,
        datasources: &mut DatasourceCache,
    ) -> Result<bool, &'static str> {
        let datasource = datasources
            .primary(self, access)
            .await
            .map_err(|error| log_failure(access, "GetBigqueryDatasource", &error))?;
        let subject: Subject = access
            .parsed_subject()
            .map_err(|error| log_failure(access, "ParseSubject", &error))?;

        let has_access = self
            .grant_backend
            .check_access(&datasource.coordinates, &subject)
            .await
            .map_err(|error| log_failure(access, "CheckAccess", &error))?;
        if has_access {
            return Ok(false);
        }

        self.grant_backend
            .grant(&datasource.coordinates, &subject, access.expires)
            .await
            .map_err(|error| log_failure(access, "Grant", &error))?;

        info!(
            access_id = %access.id,
            dataset_id = %access.dataset_id,
            subject = %subject,
            "re-granted access missing in iam"
        );
        self.append_audit(
            access,
            AccessAuditAction::AccessDriftRepaired,
            "missing in iam",
        )
        .await;
        Ok(true)
    }

    async fn append_audit(&self, access: &Access, action: AccessAuditAction, detail: &str) {
        let event = AccessAuditEvent {
            dataset_id: Some(access.dataset_id),
            actor: RECONCILER_ACTOR.to_owned(),
            subject: Some(access.subject.clone()),
            action,
            resource_id: access.id.to_string(),
            detail: Some(detail.to_owned()),
            created: None,
        };
        if let Err(error) = self.repositories.audit.append_event(event).await {
            record_reconciler_failure(RECONCILER_NAME, "AppendAuditEvent");
            warn!(access_id = %access.id, error = %error, "failed to append access audit event");
        }
    }
}

#[async_trait]
impl ReconciliationCycle for AccessReconciler {
    fn name(&self) -> &'static str {
        RECONCILER_NAME
    }

    async fn run_cycle(&self) -> AppResult<()> {
        let report = self.reconcile(Utc::now()).await?;
        info!(
            expired = report.expired,
            revoked = report.revoked,
            drift_checked = report.drift_checked,
            drift_repaired = report.drift_repaired,
            failures = report.failures,
            "access reconciliation finished"
        );
        Ok(())
    }
}

/// Primary datasource lookups memoised for one cycle.
#[derive(Default)]
struct DatasourceCache {
    entries: HashMap<Uuid, Option<BigQueryDatasource>>,
}

impl DatasourceCache {
    async fn primary(
        &mut self,
        reconciler: &AccessReconciler,
        access: &Access,
    ) -> AppResult<BigQueryDatasource> {
        let entry = match self.entries.get(&access.dataset_id) {
            Some(entry) => entry.clone(),
            None => {
                let entry = reconciler
                    .repositories
                    .datasets
                    .find_bigquery_datasource(access.dataset_id, false)
                    .await?;
                self.entries.insert(access.dataset_id, entry.clone());
                entry
            }
        };

        entry.ok_or_else(|| {
            AppError::NotFound(format!(
                "dataset '{}' has no bigquery datasource",
                access.dataset_id
            ))
        })
    }
}

fn log_failure(access: &Access, operation: &'static str, error: &AppError) -> &'static str {
    warn!(
        access_id = %access.id,
        dataset_id = %access.dataset_id,
        operation,
        error_kind = error.category(),
        error = %error,
        "access reconciliation step failed"
    );
    operation
}
