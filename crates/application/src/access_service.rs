use grantkeeper_core::{AppError, AppResult, UserIdentity};
use grantkeeper_domain::{
    Access, AccessAuditAction, BigQueryCoordinates, BigQueryDatasource, Dataset, PiiLevel,
    Subject, SubjectType, joinable_view_name,
};
use tracing::warn;
use uuid::Uuid;

use crate::access_ports::{AccessAuditEvent, AccessBackends, AccessRepositories};
use crate::reconcile_metrics::record_deferred_external_failure;

mod grants;
mod joinable_views;
mod requests;

/// Access request workflow, direct grants and revocations for dataset owners.
#[derive(Clone)]
pub struct AccessService {
    repositories: AccessRepositories,
    backends: AccessBackends,
    central_project: String,
    all_users_group: Option<String>,
}

impl AccessService {
    /// Creates an access service.
    ///
    /// `central_project` is the project joinable datasets are created in.
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
            all_users_group: None,
        }
    }

    /// Refuses grants of sensitive datasets to the organisation-wide group.
    #[must_use]
    pub fn with_all_users_group(mut self, group_email: impl Into<String>) -> Self {
        self.all_users_group = Some(group_email.into().trim().to_lowercase());
        self
    }

    async fn require_dataset(&self, dataset_id: Uuid) -> AppResult<Dataset> {
        self.repositories
            .datasets
            .find_dataset(dataset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("dataset '{dataset_id}' does not exist")))
    }

    async fn actor_groups(&self, actor: &UserIdentity) -> AppResult<Vec<String>> {
        let subject = Subject::user(actor.email())?;
        Ok(self
            .backends
            .directory
            .groups_for_subject(&subject)
            .await?
            .into_iter()
            .map(|group| group.email.to_lowercase())
            .collect())
    }

    async fn is_group_member(&self, actor: &UserIdentity, group_email: &str) -> AppResult<bool> {
        let group_email = group_email.to_lowercase();
        Ok(self
            .actor_groups(actor)
            .await?
            .iter()
            .any(|group| *group == group_email))
    }

    async fn ensure_group_member(&self, actor: &UserIdentity, group_email: &str) -> AppResult<()> {
        if self.is_group_member(actor, group_email).await? {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "'{}' is not a member of '{group_email}'",
            actor.email()
        )))
    }

    async fn ensure_dataset_owner(&self, actor: &UserIdentity, dataset: &Dataset) -> AppResult<()> {
        if self.is_group_member(actor, dataset.owner_group.as_str()).await? {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "'{}' does not own dataset '{}'",
            actor.email(),
            dataset.id
        )))
    }

    /// The actor owns a subject when it is the actor itself or one of its groups.
    async fn ensure_subject_owner(&self, actor: &UserIdentity, owner: &str) -> AppResult<()> {
        let owner = Subject::parse(owner)?;
        let allowed = match owner.subject_type() {
            SubjectType::User => owner.identifier() == actor.email(),
            SubjectType::Group => self.is_group_member(actor, owner.identifier()).await?,
            SubjectType::ServiceAccount => false,
        };
        if allowed {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "'{}' is not '{owner}'",
            actor.email()
        )))
    }

    fn ensure_grantable(&self, dataset: &Dataset, subject: &Subject) -> AppResult<()> {
        let Some(all_users_group) = self.all_users_group.as_deref() else {
            return Ok(());
        };
        if dataset.pii == PiiLevel::Sensitive
            && subject.subject_type() == SubjectType::Group
            && subject.identifier() == all_users_group
        {
            return Err(AppError::Forbidden(format!(
                "dataset '{}' contains personal data and cannot be granted to '{all_users_group}'",
                dataset.id
            )));
        }

        Ok(())
    }

    async fn primary_datasource(&self, dataset_id: Uuid) -> AppResult<BigQueryDatasource> {
        self.repositories
            .datasets
            .find_bigquery_datasource(dataset_id, false)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "dataset '{dataset_id}' has no bigquery datasource"
                ))
            })
    }

    /// Joinable-view tables of `subject` built from the pseudonymized `datasource`.
    async fn joinable_view_resources(
        &self,
        datasource: &BigQueryDatasource,
        subject: &Subject,
    ) -> AppResult<Vec<BigQueryCoordinates>> {
        if !datasource.is_pseudonymized() || subject.subject_type() != SubjectType::User {
            return Ok(Vec::new());
        }

        let view_table = joinable_view_name(&datasource.coordinates);
        Ok(self
            .repositories
            .joinable_views
            .list_joinable_views_for_reference_and_owner(
                subject.identifier(),
                datasource.dataset_id,
            )
            .await?
            .into_iter()
            .map(|view| {
                BigQueryCoordinates::new(
                    self.central_project.as_str(),
                    view.name,
                    view_table.as_str(),
                )
            })
            .collect())
    }

    /// Issues IAM grants for a committed access row. Failures are left to the
    /// drift check.
    async fn grant_externally(&self, access: &Access, include_joinable_views: bool) {
        let result = async {
            let subject = access.parsed_subject()?;
            let datasource = self.primary_datasource(access.dataset_id).await?;
            let mut resources = vec![datasource.coordinates.clone()];
            if include_joinable_views {
                resources.extend(self.joinable_view_resources(&datasource, &subject).await?);
            }

            for resource in &resources {
                self.backends
                    .grant
                    .grant(resource, &subject, access.expires)
                    .await?;
            }

            Ok::<(), AppError>(())
        }
        .await;

        if let Err(error) = result {
            record_deferred_external_failure("Grant");
            warn!(
                access_id = %access.id,
                dataset_id = %access.dataset_id,
                error = %error,
                "external grant failed after commit; left to drift check"
            );
        }
    }

    /// Records an audit event for a write that has already committed, so a
    /// failure is logged and counted instead of returned.
    async fn append_audit(&self, event: AccessAuditEvent) {
        let action = event.action.as_str();
        let resource_id = event.resource_id.clone();
        if let Err(error) = self.repositories.audit.append_event(event).await {
            record_deferred_external_failure("AppendAuditEvent");
            warn!(
                action,
                resource_id = %resource_id,
                error = %error,
                "failed to append access audit event after commit"
            );
        }
    }

    fn audit_event(
        actor: &UserIdentity,
        dataset_id: Uuid,
        subject: Option<&str>,
        action: AccessAuditAction,
        resource_id: Uuid,
        detail: Option<String>,
    ) -> AccessAuditEvent {
        AccessAuditEvent {
            dataset_id: Some(dataset_id),
            actor: actor.subject(),
            subject: subject.map(str::to_owned),
            action,
            resource_id: resource_id.to_string(),
            detail,
            created: None,
        }
    }
}

fn resolve_subject(
    actor: &UserIdentity,
    identifier: Option<&str>,
    subject_type: Option<&str>,
) -> AppResult<Subject> {
    let subject_type = match subject_type {
        Some(value) => value.parse::<SubjectType>()?,
        None => SubjectType::User,
    };
    Subject::new(subject_type, identifier.unwrap_or(actor.email()))
}
