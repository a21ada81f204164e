use chrono::Utc;
use grantkeeper_core::{AppError, AppResult, UserIdentity};
use grantkeeper_domain::{Access, AccessAuditAction, validate_expiry};
use uuid::Uuid;

use crate::access_ports::{AccessAuditEvent, GrantAccessInput, GrantAccessToDatasetInput};

use super::{AccessService, resolve_subject};

const ACCESS_HISTORY_LIMIT: usize = 200;

impl AccessService {
    /// Grants access directly as a dataset owner.
    ///
    /// Any open grant for the same subject is closed in the same transaction.
    /// IAM grants on the dataset and on the subject's joinable views follow
    /// the commit.
    pub async fn grant_access_to_dataset(
        &self,
        actor: &UserIdentity,
        input: GrantAccessToDatasetInput,
    ) -> AppResult<Access> {
        validate_expiry(input.expires, Utc::now())?;
        let dataset = self.require_dataset(input.dataset_id).await?;
        self.ensure_dataset_owner(actor, &dataset).await?;

        let subject = resolve_subject(
            actor,
            input.subject.as_deref(),
            input.subject_type.as_deref(),
        )?;
        self.ensure_grantable(&dataset, &subject)?;

        let access = self
            .repositories
            .access
            .grant_access(GrantAccessInput {
                dataset_id: dataset.id,
                subject: subject.to_string(),
                expires: input.expires,
                granter: actor.email().to_owned(),
            })
            .await?;

        self.grant_externally(&access, true).await;

        self.append_audit(Self::audit_event(
            actor,
            access.dataset_id,
            Some(access.subject.as_str()),
            AccessAuditAction::AccessGranted,
            access.id,
            None,
        ))
        .await;

        Ok(access)
    }

    /// Revokes one grant as a dataset owner or as the grantee itself.
    ///
    /// IAM bindings are removed before the row is closed, so a failed revoke
    /// leaves the grant active and the call can be retried.
    pub async fn revoke_access_to_dataset(
        &self,
        actor: &UserIdentity,
        access_id: Uuid,
    ) -> AppResult<()> {
        let access = self
            .repositories
            .access
            .find_access(access_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("access '{access_id}' does not exist")))?;
        if access.revoked.is_some() {
            return Err(AppError::Conflict(format!(
                "access '{access_id}' is already revoked"
            )));
        }

        let subject = access.parsed_subject()?;
        if subject.to_string() != actor.subject() {
            let dataset = self.require_dataset(access.dataset_id).await?;
            self.ensure_dataset_owner(actor, &dataset).await?;
        }

        let datasource = self.primary_datasource(access.dataset_id).await?;
        for resource in self.joinable_view_resources(&datasource, &subject).await? {
            self.backends.grant.revoke(&resource, &subject).await?;
        }
        self.backends
            .grant
            .revoke(&datasource.coordinates, &subject)
            .await?;

        self.repositories.access.revoke_access(access_id).await?;

        self.append_audit(Self::audit_event(
            actor,
            access.dataset_id,
            Some(access.subject.as_str()),
            AccessAuditAction::AccessRevoked,
            access.id,
            None,
        ))
        .await;

        Ok(())
    }

    /// Lists the grants currently active on a dataset.
    ///
    /// Dataset owners see every grant; other callers only see grants held by
    /// themselves or by one of their groups.
    pub async fn list_active_access_to_dataset(
        &self,
        actor: &UserIdentity,
        dataset_id: Uuid,
    ) -> AppResult<Vec<Access>> {
        let dataset = self.require_dataset(dataset_id).await?;
        let active = self
            .repositories
            .access
            .list_active_access_for_dataset(dataset_id, Utc::now())
            .await?;

        let groups = self.actor_groups(actor).await?;
        if groups
            .iter()
            .any(|group| group.eq_ignore_ascii_case(dataset.owner_group.as_str()))
        {
            return Ok(active);
        }

        let mut visible_subjects = vec![actor.subject()];
        visible_subjects.extend(groups.into_iter().map(|group| format!("group:{group}")));
        Ok(active
            .into_iter()
            .filter(|access| visible_subjects.contains(&access.subject))
            .collect())
    }

    /// Returns the newest access history entries of a dataset the caller owns.
    pub async fn access_history_for_dataset(
        &self,
        actor: &UserIdentity,
        dataset_id: Uuid,
    ) -> AppResult<Vec<AccessAuditEvent>> {
        let dataset = self.require_dataset(dataset_id).await?;
        self.ensure_dataset_owner(actor, &dataset).await?;

        self.repositories
            .audit
            .list_events_for_dataset(dataset_id, ACCESS_HISTORY_LIMIT)
            .await
    }
}
