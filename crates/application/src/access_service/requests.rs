use chrono::Utc;
use grantkeeper_core::{AppError, AppResult, UserIdentity};
use grantkeeper_domain::{
    Access, AccessAuditAction, AccessRequest, Subject, SubjectType, validate_expiry,
};
use uuid::Uuid;

use crate::access_ports::{CreateAccessRequestInput, NewAccessRequest, UpdateAccessRequestInput};

use super::{AccessService, resolve_subject};

impl AccessService {
    /// Files a pending access request.
    ///
    /// The subject defaults to the caller. When an owning group is given the
    /// caller must belong to it, and the whole group can manage the request.
    pub async fn create_access_request(
        &self,
        actor: &UserIdentity,
        input: CreateAccessRequestInput,
    ) -> AppResult<AccessRequest> {
        validate_expiry(input.expires, Utc::now())?;
        self.require_dataset(input.dataset_id).await?;

        let subject = resolve_subject(
            actor,
            input.subject.as_deref(),
            input.subject_type.as_deref(),
        )?;
        let owner = match input.owner_group.as_deref() {
            Some(group) => {
                self.ensure_group_member(actor, group).await?;
                Subject::new(SubjectType::Group, group)?
            }
            None => Subject::user(actor.email())?,
        };

        let request = self
            .repositories
            .requests
            .create_access_request(NewAccessRequest {
                dataset_id: input.dataset_id,
                subject: subject.to_string(),
                owner: owner.to_string(),
                expires: input.expires,
                documentation_id: input.documentation_id,
            })
            .await?;

        self.append_audit(Self::audit_event(
            actor,
            request.dataset_id,
            Some(request.subject.as_str()),
            AccessAuditAction::AccessRequestCreated,
            request.id,
            None,
        ))
        .await;

        Ok(request)
    }

    /// Changes owner, expiry or documentation of a pending request.
    pub async fn update_access_request(
        &self,
        actor: &UserIdentity,
        input: UpdateAccessRequestInput,
    ) -> AppResult<AccessRequest> {
        validate_expiry(input.expires, Utc::now())?;
        let request = self.require_access_request(input.id).await?;
        request.ensure_pending()?;
        self.ensure_subject_owner(actor, request.owner.as_str())
            .await?;

        let owner = Subject::parse(input.owner.as_str())?;
        if owner.to_string() != request.owner {
            self.ensure_subject_owner(actor, owner.to_string().as_str())
                .await?;
        }

        let updated = self
            .repositories
            .requests
            .update_access_request(UpdateAccessRequestInput {
                owner: owner.to_string(),
                ..input
            })
            .await?;

        self.append_audit(Self::audit_event(
            actor,
            updated.dataset_id,
            Some(updated.subject.as_str()),
            AccessAuditAction::AccessRequestUpdated,
            updated.id,
            None,
        ))
        .await;

        Ok(updated)
    }

    /// Withdraws a pending request owned by the caller or one of its groups.
    pub async fn delete_access_request(
        &self,
        actor: &UserIdentity,
        request_id: Uuid,
    ) -> AppResult<()> {
        let request = self.require_access_request(request_id).await?;
        request.ensure_pending()?;
        self.ensure_subject_owner(actor, request.owner.as_str())
            .await?;

        self.repositories
            .requests
            .delete_access_request(request_id)
            .await?;

        self.append_audit(Self::audit_event(
            actor,
            request.dataset_id,
            Some(request.subject.as_str()),
            AccessAuditAction::AccessRequestDeleted,
            request.id,
            None,
        ))
        .await;

        Ok(())
    }

    /// Approves a pending request as a dataset owner.
    ///
    /// The access row and the request transition commit together. The IAM
    /// grant is issued afterwards; if it fails the access stays recorded and
    /// the access reconciler re-asserts it.
    pub async fn approve_access_request(
        &self,
        actor: &UserIdentity,
        request_id: Uuid,
    ) -> AppResult<Access> {
        let request = self.require_access_request(request_id).await?;
        request.ensure_pending()?;
        let dataset = self.require_dataset(request.dataset_id).await?;
        self.ensure_dataset_owner(actor, &dataset).await?;
        self.ensure_grantable(&dataset, &Subject::parse(request.subject.as_str())?)?;

        let access = self
            .repositories
            .requests
            .approve_access_request(request_id, actor.email())
            .await?;

        self.grant_externally(&access, false).await;

        self.append_audit(Self::audit_event(
            actor,
            access.dataset_id,
            Some(access.subject.as_str()),
            AccessAuditAction::AccessRequestApproved,
            request.id,
            Some(format!("access '{}'", access.id)),
        ))
        .await;

        Ok(access)
    }

    /// Denies a pending request as a dataset owner.
    pub async fn deny_access_request(
        &self,
        actor: &UserIdentity,
        request_id: Uuid,
        reason: Option<&str>,
    ) -> AppResult<()> {
        let request = self.require_access_request(request_id).await?;
        request.ensure_pending()?;
        let dataset = self.require_dataset(request.dataset_id).await?;
        self.ensure_dataset_owner(actor, &dataset).await?;

        self.repositories
            .requests
            .deny_access_request(request_id, actor.email(), reason)
            .await?;

        self.append_audit(Self::audit_event(
            actor,
            request.dataset_id,
            Some(request.subject.as_str()),
            AccessAuditAction::AccessRequestDenied,
            request.id,
            reason.map(str::to_owned),
        ))
        .await;

        Ok(())
    }

    /// Lists every request for a dataset the caller owns.
    pub async fn list_access_requests_for_dataset(
        &self,
        actor: &UserIdentity,
        dataset_id: Uuid,
    ) -> AppResult<Vec<AccessRequest>> {
        let dataset = self.require_dataset(dataset_id).await?;
        self.ensure_dataset_owner(actor, &dataset).await?;

        self.repositories
            .requests
            .list_access_requests_for_dataset(dataset_id)
            .await
    }

    /// Lists pending requests owned by the caller or any of its groups.
    pub async fn list_access_requests_for_owner(
        &self,
        actor: &UserIdentity,
    ) -> AppResult<Vec<AccessRequest>> {
        let mut owners = vec![actor.subject()];
        owners.extend(
            self.actor_groups(actor)
                .await?
                .into_iter()
                .map(|group| format!("group:{group}")),
        );

        self.repositories
            .requests
            .list_pending_access_requests_for_owners(&owners)
            .await
    }

    async fn require_access_request(&self, request_id: Uuid) -> AppResult<AccessRequest> {
        self.repositories
            .requests
            .find_access_request(request_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("access request '{request_id}' does not exist"))
            })
    }
}
