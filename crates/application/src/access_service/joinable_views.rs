use chrono::Utc;
use grantkeeper_core::{AppError, AppResult, NonEmptyString, UserIdentity};
use grantkeeper_domain::{JoinableView, Subject, validate_expiry};
use tracing::warn;
use uuid::Uuid;

use crate::access_ports::{CreateJoinableViewInput, CreateJoinableViewsInput, JoinableViewSource};
use crate::reconcile_metrics::record_deferred_external_failure;

use super::AccessService;

impl AccessService {
    /// Creates a joinable dataset over the pseudonymized sources of several
    /// datasets and grants it to the caller.
    ///
    /// The caller must own or hold active access to every dataset.
    pub async fn create_joinable_views(
        &self,
        actor: &UserIdentity,
        input: CreateJoinableViewsInput,
    ) -> AppResult<JoinableView> {
        let name = NonEmptyString::new(input.name)?;
        let now = Utc::now();
        validate_expiry(input.expires, now)?;
        if input.dataset_ids.is_empty() {
            return Err(AppError::Validation(
                "a joinable view needs at least one dataset".to_owned(),
            ));
        }

        let mut sources = Vec::with_capacity(input.dataset_ids.len());
        let mut datasource_ids = Vec::with_capacity(input.dataset_ids.len());
        for dataset_id in &input.dataset_ids {
            let (source, datasource_id) = self.joinable_view_source(actor, *dataset_id).await?;
            sources.push(source);
            datasource_ids.push(datasource_id);
        }

        let created = self
            .backends
            .warehouse
            .create_joinable_views_for_user(name.as_str(), &sources)
            .await?;

        let view = self
            .repositories
            .joinable_views
            .create_joinable_view(CreateJoinableViewInput {
                name: created.dataset,
                owner: actor.email().to_owned(),
                expires: input.expires,
                datasource_ids,
            })
            .await?;

        let subject = Subject::user(actor.email())?;
        for resource in &created.views {
            if let Err(error) = self
                .backends
                .grant
                .grant(resource, &subject, input.expires)
                .await
            {
                record_deferred_external_failure("GrantJoinableView");
                warn!(
                    joinable_view_id = %view.id,
                    resource = %resource,
                    error = %error,
                    "joinable view grant failed; left to joinable view reconciler"
                );
            }
        }

        Ok(view)
    }

    /// Lists the caller's live joinable views.
    pub async fn list_joinable_views_for_owner(
        &self,
        actor: &UserIdentity,
    ) -> AppResult<Vec<JoinableView>> {
        self.repositories
            .joinable_views
            .list_joinable_views_for_owner(actor.email())
            .await
    }

    async fn joinable_view_source(
        &self,
        actor: &UserIdentity,
        dataset_id: Uuid,
    ) -> AppResult<(JoinableViewSource, Uuid)> {
        let dataset = self.require_dataset(dataset_id).await?;
        if !self.is_group_member(actor, dataset.owner_group.as_str()).await? {
            let caller = actor.subject();
            let has_access = self
                .repositories
                .access
                .list_active_access_for_dataset(dataset_id, Utc::now())
                .await?
                .iter()
                .any(|access| access.subject == caller);
            if !has_access {
                return Err(AppError::Forbidden(format!(
                    "'{}' has no access to dataset '{dataset_id}'",
                    actor.email()
                )));
            }
        }

        let pseudo = self.primary_datasource(dataset_id).await?;
        if !pseudo.is_pseudonymized() {
            return Err(AppError::Validation(format!(
                "dataset '{dataset_id}' is not pseudonymized"
            )));
        }
        let reference = self
            .repositories
            .datasets
            .find_bigquery_datasource(dataset_id, true)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "dataset '{dataset_id}' has no reference datasource"
                ))
            })?;

        Ok((
            JoinableViewSource {
                reference: reference.coordinates,
                pseudo: pseudo.coordinates,
                pseudo_columns: pseudo.pseudo_columns,
            },
            pseudo.id,
        ))
    }
}
