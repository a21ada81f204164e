use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grantkeeper_core::{AppError, AppResult};
use grantkeeper_domain::{
    AccessAuditAction, BigQueryDatasource, Dataset, JoinableView, JoinableViewWithReference,
    RECONCILER_ACTOR, Subject,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::access_ports::{AccessAuditEvent, AccessBackends, AccessRepositories};
use crate::reconcile_metrics::record_reconciler_failure;
use crate::reconciler_loop::ReconciliationCycle;

const RECONCILER_NAME: &str = "joinable_views";

/// Counts from one joinable-view reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinableViewReconcileReport {
    /// Pseudonymized views dropped because their dataset is gone.
    pub orphaned_sources_deleted: usize,
    /// Joinable datasets dropped after expiry.
    pub expired_views_deleted: usize,
    /// Joinable-view tables granted to their owner.
    pub access_granted: usize,
    /// Joinable-view tables revoked from their owner.
    pub access_revoked: usize,
    /// Entities skipped because of an error.
    pub failures: usize,
}

/// Cleans up orphaned and expired pseudonymized views and re-derives owner
/// access to the joinable views that remain.
#[derive(Clone)]
pub struct JoinableViewReconciler {
    repositories: AccessRepositories,
    backends: AccessBackends,
    central_project: String,
}

impl JoinableViewReconciler {
    /// Creates a joinable-view reconciler for views in `central_project`.
    #[must_use]
    pub fn new(
        repositories: AccessRepositories,
        backends: AccessBackends,
        central_project: impl Into<String>,
    ) -> Self {
        Self {
            repositories,
            backends,
            central_project: central_project.into(),
        }
    }

    /// Runs the three passes as of `now`.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> AppResult<JoinableViewReconcileReport> {
        let mut report = JoinableViewReconcileReport::default();
        self.delete_orphaned_sources(&mut report).await;
        self.delete_expired_views(now, &mut report).await;
        self.rederive_access(now, &mut report).await;
        Ok(report)
    }

    async fn delete_orphaned_sources(&self, report: &mut JoinableViewReconcileReport) {
        let orphans = match self
            .repositories
            .datasets
            .list_orphaned_pseudo_datasources()
            .await
        {
            Ok(orphans) => orphans,
            Err(error) => {
                fail_pass(report, "ListOrphanedPseudoDatasources", &error);
                return;
            }
        };

        for datasource in &orphans {
            if !datasource.is_pseudonymized() {
                warn!(
                    datasource_id = %datasource.id,
                    "orphaned datasource has no pseudo columns; skipping"
                );
                continue;
            }

            match self.delete_orphaned_source(datasource).await {
                Ok(()) => report.orphaned_sources_deleted += 1,
                Err((operation, error)) => {
                    warn!(datasource_id = %datasource.id, operation, error = %error, "orphaned pseudo view cleanup failed");
                    fail(report, operation);
                }
            }
        }
    }

    async fn delete_orphaned_source(
        &self,
        datasource: &BigQueryDatasource,
    ) -> Result<(), (&'static str, AppError)> {
        let views = self
            .repositories
            .joinable_views
            .list_joinable_views_for_datasource(datasource.id)
            .await
            .map_err(|error| ("ListJoinableViewsForDatasource", error))?;
        for view in &views {
            self.backends
                .warehouse
                .delete_joinable_view(view.name.as_str(), &datasource.coordinates)
                .await
                .map_err(|error| ("DeleteJoinableView", error))?;
        }

        self.backends
            .warehouse
            .delete_pseudo_view(&datasource.coordinates)
            .await
            .map_err(|error| ("DeletePseudoView", error))?;
        self.repositories
            .datasets
            .set_datasource_deleted(datasource.id)
            .await
            .map_err(|error| ("SetDatasourceDeleted", error))?;

        self.append_audit(AccessAuditEvent {
            dataset_id: Some(datasource.dataset_id),
            actor: RECONCILER_ACTOR.to_owned(),
            subject: None,
            action: AccessAuditAction::PseudoViewDeleted,
            resource_id: datasource.id.to_string(),
            detail: Some(datasource.coordinates.to_string()),
            created: None,
        })
        .await;
        Ok(())
    }

    async fn delete_expired_views(
        &self,
        now: DateTime<Utc>,
        report: &mut JoinableViewReconcileReport,
    ) {
        let expired = match self
            .repositories
            .joinable_views
            .list_expired_joinable_views(now)
            .await
        {
            Ok(expired) => expired,
            Err(error) => {
                fail_pass(report, "ListExpiredJoinableViews", &error);
                return;
            }
        };

        for view in &expired {
            match self.delete_expired_view(view).await {
                Ok(()) => report.expired_views_deleted += 1,
                Err((operation, error)) => {
                    warn!(joinable_view_id = %view.id, operation, error = %error, "expired joinable view cleanup failed");
                    fail(report, operation);
                }
            }
        }
    }

    async fn delete_expired_view(
        &self,
        view: &JoinableView,
    ) -> Result<(), (&'static str, AppError)> {
        self.backends
            .warehouse
            .delete_joinable_dataset(view.name.as_str())
            .await
            .map_err(|error| ("DeleteExpiredDataset", error))?;
        self.repositories
            .joinable_views
            .set_joinable_view_deleted(view.id)
            .await
            .map_err(|error| ("SetJoinableViewDeleted", error))?;

        self.append_audit(AccessAuditEvent {
            dataset_id: None,
            actor: RECONCILER_ACTOR.to_owned(),
            subject: Some(format!("user:{}", view.owner)),
            action: AccessAuditAction::JoinableViewDeleted,
            resource_id: view.id.to_string(),
            detail: Some(view.name.clone()),
            created: None,
        })
        .await;
        Ok(())
    }

    async fn rederive_access(&self, now: DateTime<Utc>, report: &mut JoinableViewReconcileReport) {
        let views = match self
            .repositories
            .joinable_views
            .list_joinable_views_with_reference()
            .await
        {
            Ok(views) => views,
            Err(error) => {
                fail_pass(report, "ListJoinableViewsWithReference", &error);
                return;
            }
        };

        let mut lookups = DerivationLookups::default();
        // Expired views whose drop failed are left to the next expiry pass.
        for view in views.iter().filter(|view| !view.view.is_expired(now)) {
            match self.apply_owner_access(view, now, &mut lookups).await {
                Ok(true) => report.access_granted += 1,
                Ok(false) => report.access_revoked += 1,
                Err((operation, error)) => {
                    warn!(
                        joinable_view_id = %view.view.id,
                        dataset_id = %view.dataset_id,
                        operation,
                        error = %error,
                        "joinable view access derivation failed"
                    );
                    fail(report, operation);
                }
            }
        }
    }

    /// Grants or revokes the owner's access to one joinable-view table and
    /// returns whether access was granted.
    async fn apply_owner_access(
        &self,
        view: &JoinableViewWithReference,
        now: DateTime<Utc>,
        lookups: &mut DerivationLookups,
    ) -> Result<bool, (&'static str, AppError)> {
        let owner = Subject::user(view.view.owner.as_str()).map_err(|error| ("ParseOwner", error))?;
        let dataset = lookups
            .dataset(self, view.dataset_id)
            .await
            .map_err(|error| ("GetDataset", error))?;

        let in_owner_group = lookups
            .groups(self, &owner)
            .await
            .map_err(|error| ("GetGroups", error))?
            .iter()
            .any(|group| group.eq_ignore_ascii_case(dataset.owner_group.as_str()));
        let has_access = in_owner_group
            || lookups
                .active_subjects(self, view.dataset_id, now)
                .await
                .map_err(|error| ("ListActiveAccess", error))?
                .iter()
                .any(|identifier| identifier == owner.identifier());

        let resource = view.resource(self.central_project.as_str());
        if has_access {
            self.backends
                .grant
                .grant(&resource, &owner, view.view.expires)
                .await
                .map_err(|error| ("Grant", error))?;
        } else {
            self.backends
                .grant
                .revoke(&resource, &owner)
                .await
                .map_err(|error| ("Revoke", error))?;
        }

        Ok(has_access)
    }

    async fn append_audit(&self, event: AccessAuditEvent) {
        let resource_id = event.resource_id.clone();
        if let Err(error) = self.repositories.audit.append_event(event).await {
            record_reconciler_failure(RECONCILER_NAME, "AppendAuditEvent");
            warn!(resource_id, error = %error, "failed to append access audit event");
        }
    }
}

#[async_trait]
impl ReconciliationCycle for JoinableViewReconciler {
    fn name(&self) -> &'static str {
        RECONCILER_NAME
    }

    async fn run_cycle(&self) -> AppResult<()> {
        let report = self.reconcile(Utc::now()).await?;
        info!(
            orphaned_sources_deleted = report.orphaned_sources_deleted,
            expired_views_deleted = report.expired_views_deleted,
            access_granted = report.access_granted,
            access_revoked = report.access_revoked,
            failures = report.failures,
            "joinable view reconciliation finished"
        );
        Ok(())
    }
}

fn fail(report: &mut JoinableViewReconcileReport, operation: &'static str) {
    report.failures += 1;
    record_reconciler_failure(RECONCILER_NAME, operation);
}

fn fail_pass(report: &mut JoinableViewReconcileReport, operation: &'static str, error: &AppError) {
    warn!(operation, error = %error, "joinable view pass could not list its input");
    fail(report, operation);
}

/// Store and directory reads memoised for one derivation pass.
#[derive(Default)]
struct DerivationLookups {
    datasets: HashMap<Uuid, Dataset>,
    groups: HashMap<String, Vec<String>>,
    active_subjects: HashMap<Uuid, Vec<String>>,
}

impl DerivationLookups {
    async fn dataset(
        &mut self,
        reconciler: &JoinableViewReconciler,
        dataset_id: Uuid,
    ) -> AppResult<Dataset> {
        if let Some(dataset) = self.datasets.get(&dataset_id) {
            return Ok(dataset.clone());
        }

        let dataset = reconciler
            .repositories
            .datasets
            .find_dataset(dataset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("dataset '{dataset_id}' does not exist")))?;
        self.datasets.insert(dataset_id, dataset.clone());
        Ok(dataset)
    }

    async fn groups(
        &mut self,
        reconciler: &JoinableViewReconciler,
        owner: &Subject,
    ) -> AppResult<Vec<String>> {
        if let Some(groups) = self.groups.get(owner.identifier()) {
            return Ok(groups.clone());
        }

        let groups: Vec<String> = reconciler
            .backends
            .directory
            .groups_for_subject(owner)
            .await?
            .into_iter()
            .map(|group| group.email)
            .collect();
        self.groups
            .insert(owner.identifier().to_owned(), groups.clone());
        Ok(groups)
    }

    /// Identifiers of subjects with active access; malformed subjects are
    /// logged and left out.
    async fn active_subjects(
        &mut self,
        reconciler: &JoinableViewReconciler,
        dataset_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<String>> {
        if let Some(subjects) = self.active_subjects.get(&dataset_id) {
            return Ok(subjects.clone());
        }

        let mut subjects = Vec::new();
        for access in reconciler
            .repositories
            .access
            .list_active_access_for_dataset(dataset_id, now)
            .await?
        {
            match access.parsed_subject() {
                Ok(subject) => subjects.push(subject.identifier().to_owned()),
                Err(error) => {
                    warn!(access_id = %access.id, error = %error, "skipping access with malformed subject");
                }
            }
        }
        self.active_subjects.insert(dataset_id, subjects.clone());
        Ok(subjects)
    }
}

#[cfg(test)]
mod tests;
