use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use grantkeeper_core::AppResult;
use grantkeeper_domain::{
    Access, AccessRequest, BigQueryDatasource, Dataset, JoinableView, JoinableViewWithReference,
};

use super::inputs::{
    CreateJoinableViewInput, GrantAccessInput, NewAccessRequest, UpdateAccessRequestInput,
};

/// Store port for dataset access grants.
#[async_trait]
pub trait AccessRepository: Send + Sync {
    /// Finds one access row.
    async fn find_access(&self, access_id: Uuid) -> AppResult<Option<Access>>;

    /// Lists rows with `expires < now` that are not revoked yet.
    async fn list_unrevoked_expired_access(&self, now: DateTime<Utc>) -> AppResult<Vec<Access>>;

    /// Lists all active rows, ordered by dataset.
    async fn list_active_access(&self, now: DateTime<Utc>) -> AppResult<Vec<Access>>;

    /// Lists active rows for one dataset.
    async fn list_active_access_for_dataset(
        &self,
        dataset_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Access>>;

    /// Atomically closes every unrevoked row for the dataset and subject and
    /// inserts the new grant.
    async fn grant_access(&self, input: GrantAccessInput) -> AppResult<Access>;

    /// Marks one unrevoked row revoked; `NotFound` when none matches.
    async fn revoke_access(&self, access_id: Uuid) -> AppResult<()>;
}

/// Store port for access requests.
#[async_trait]
pub trait AccessRequestRepository: Send + Sync {
    /// Inserts a pending request.
    async fn create_access_request(&self, request: NewAccessRequest) -> AppResult<AccessRequest>;

    /// Finds one request.
    async fn find_access_request(&self, request_id: Uuid) -> AppResult<Option<AccessRequest>>;

    /// Lists all requests for one dataset, newest first.
    async fn list_access_requests_for_dataset(
        &self,
        dataset_id: Uuid,
    ) -> AppResult<Vec<AccessRequest>>;

    /// Lists pending requests owned by any of `owners`.
    async fn list_pending_access_requests_for_owners(
        &self,
        owners: &[String],
    ) -> AppResult<Vec<AccessRequest>>;

    /// Updates a pending request.
    async fn update_access_request(
        &self,
        input: UpdateAccessRequestInput,
    ) -> AppResult<AccessRequest>;

    /// Deletes a pending request.
    async fn delete_access_request(&self, request_id: Uuid) -> AppResult<()>;

    /// In one transaction, grants the requested access with the request linked
    /// and flips the request to approved.
    async fn approve_access_request(&self, request_id: Uuid, granter: &str) -> AppResult<Access>;

    /// Flips a pending request to denied.
    async fn deny_access_request(
        &self,
        request_id: Uuid,
        granter: &str,
        reason: Option<&str>,
    ) -> AppResult<()>;
}

/// Store port for joinable views.
#[async_trait]
pub trait JoinableViewRepository: Send + Sync {
    /// Inserts a view together with its datasource links.
    async fn create_joinable_view(&self, input: CreateJoinableViewInput)
    -> AppResult<JoinableView>;

    /// Lists live views owned by `owner`.
    async fn list_joinable_views_for_owner(&self, owner: &str) -> AppResult<Vec<JoinableView>>;

    /// Lists live views whose `expires < now`.
    async fn list_expired_joinable_views(&self, now: DateTime<Utc>)
    -> AppResult<Vec<JoinableView>>;

    /// Lists one row per live view and live pseudonymized source it joins.
    async fn list_joinable_views_with_reference(&self) -> AppResult<Vec<JoinableViewWithReference>>;

    /// Lists live views of `owner` that join a source of `dataset_id`.
    async fn list_joinable_views_for_reference_and_owner(
        &self,
        owner: &str,
        dataset_id: Uuid,
    ) -> AppResult<Vec<JoinableView>>;

    /// Lists live views joining one pseudonymized datasource.
    async fn list_joinable_views_for_datasource(
        &self,
        datasource_id: Uuid,
    ) -> AppResult<Vec<JoinableView>>;

    /// Soft-deletes a view.
    async fn set_joinable_view_deleted(&self, joinable_view_id: Uuid) -> AppResult<()>;
}

/// Read port for the dataset catalog.
#[async_trait]
pub trait DatasetRepository: Send + Sync {
    /// Finds one dataset.
    async fn find_dataset(&self, dataset_id: Uuid) -> AppResult<Option<Dataset>>;

    /// Finds the live primary (`is_reference = false`) or reference datasource.
    async fn find_bigquery_datasource(
        &self,
        dataset_id: Uuid,
        is_reference: bool,
    ) -> AppResult<Option<BigQueryDatasource>>;

    /// Lists live pseudonymized datasources whose dataset no longer exists.
    async fn list_orphaned_pseudo_datasources(&self) -> AppResult<Vec<BigQueryDatasource>>;

    /// Soft-deletes a datasource.
    async fn set_datasource_deleted(&self, datasource_id: Uuid) -> AppResult<()>;
}
