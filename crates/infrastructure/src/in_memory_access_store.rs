use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use grantkeeper_application::{
    AccessAuditEvent, AccessRepositories, AccessRepository, AccessRequestRepository,
    AuditRepository, CreateJoinableViewInput, DatasetRepository, GrantAccessInput,
    JoinableViewRepository, NewAccessRequest, UpdateAccessRequestInput,
};
use grantkeeper_core::{AppError, AppResult};
use grantkeeper_domain::{
    Access, AccessRequest, AccessRequestStatus, BigQueryDatasource, Dataset, JoinableView,
    JoinableViewDatasource, JoinableViewWithReference,
};

#[derive(Debug, Default)]
struct StoredDatasource {
    datasource: Option<BigQueryDatasource>,
    deleted: bool,
}

#[derive(Debug, Default)]
struct AccessStoreState {
    datasets: HashMap<Uuid, Dataset>,
    datasources: HashMap<Uuid, StoredDatasource>,
    access: HashMap<Uuid, Access>,
    requests: HashMap<Uuid, AccessRequest>,
    views: HashMap<Uuid, JoinableView>,
    view_sources: Vec<JoinableViewDatasource>,
    events: Vec<AccessAuditEvent>,
}

impl AccessStoreState {
    fn live_datasource(&self, datasource_id: Uuid) -> Option<&BigQueryDatasource> {
        self.datasources
            .get(&datasource_id)
            .filter(|stored| !stored.deleted)
            .and_then(|stored| stored.datasource.as_ref())
    }

    fn pending_request(&self, request_id: Uuid) -> AppResult<&AccessRequest> {
        let request = self.requests.get(&request_id).ok_or_else(|| {
            AppError::NotFound(format!("access request '{request_id}' was not found"))
        })?;
        request.ensure_pending()?;
        Ok(request)
    }
}

/// Closes open grants for the pair and inserts a new one into `access`.
fn replace_open_access(
    access: &mut HashMap<Uuid, Access>,
    input: GrantAccessInput,
    access_request_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Access {
    for open in access.values_mut().filter(|existing| {
        existing.dataset_id == input.dataset_id
            && existing.subject == input.subject
            && existing.revoked.is_none()
    }) {
        open.revoked = Some(now);
    }

    let created = Access {
        id: Uuid::new_v4(),
        dataset_id: input.dataset_id,
        subject: input.subject,
        granter: input.granter,
        expires: input.expires,
        created: now,
        revoked: None,
        access_request_id,
    };
    access.insert(created.id, created.clone());
    created
}

/// In-memory implementation of every access store port.
///
/// Composite writes stage their changes and commit them only when every step
/// succeeds, matching the transactional behaviour of the PostgreSQL store.
#[derive(Debug, Default)]
pub struct InMemoryAccessStore {
    state: RwLock<AccessStoreState>,
}

impl InMemoryAccessStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the store behind every repository port.
    #[must_use]
    pub fn repositories(self: &Arc<Self>) -> AccessRepositories {
        AccessRepositories {
            access: self.clone(),
            requests: self.clone(),
            datasets: self.clone(),
            joinable_views: self.clone(),
            audit: self.clone(),
        }
    }

    /// Registers a catalog dataset.
    pub async fn insert_dataset(&self, dataset: Dataset) {
        self.state.write().await.datasets.insert(dataset.id, dataset);
    }

    /// Removes a catalog dataset, leaving its datasources behind.
    pub async fn remove_dataset(&self, dataset_id: Uuid) {
        self.state.write().await.datasets.remove(&dataset_id);
    }

    /// Registers a BigQuery datasource.
    pub async fn insert_datasource(&self, datasource: BigQueryDatasource) {
        self.state.write().await.datasources.insert(
            datasource.id,
            StoredDatasource {
                datasource: Some(datasource),
                deleted: false,
            },
        );
    }
}

#[async_trait]
impl AccessRepository for InMemoryAccessStore {
    async fn find_access(&self, access_id: Uuid) -> AppResult<Option<Access>> {
        Ok(self.state.read().await.access.get(&access_id).cloned())
    }

    async fn list_unrevoked_expired_access(&self, now: DateTime<Utc>) -> AppResult<Vec<Access>> {
        let state = self.state.read().await;
        let mut rows: Vec<Access> = state
            .access
            .values()
            .filter(|access| access.is_expired_unrevoked(now))
            .cloned()
            .collect();
        rows.sort_by_key(|access| (access.expires, access.id));
        Ok(rows)
    }

    async fn list_active_access(&self, now: DateTime<Utc>) -> AppResult<Vec<Access>> {
        let state = self.state.read().await;
        let mut rows: Vec<Access> = state
            .access
            .values()
            .filter(|access| access.is_active(now))
            .cloned()
            .collect();
        rows.sort_by_key(|access| (access.dataset_id, access.created));
        Ok(rows)
    }

    async fn list_active_access_for_dataset(
        &self,
        dataset_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Access>> {
        let state = self.state.read().await;
        let mut rows: Vec<Access> = state
            .access
            .values()
            .filter(|access| access.dataset_id == dataset_id && access.is_active(now))
            .cloned()
            .collect();
        rows.sort_by_key(|access| access.created);
        Ok(rows)
    }

    async fn grant_access(&self, input: GrantAccessInput) -> AppResult<Access> {
        let mut state = self.state.write().await;
        Ok(replace_open_access(&mut state.access, input, None, Utc::now()))
    }

    async fn revoke_access(&self, access_id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        let access = state
            .access
            .get_mut(&access_id)
            .filter(|access| access.revoked.is_none())
            .ok_or_else(|| {
                AppError::NotFound(format!("open access '{access_id}' was not found"))
            })?;
        access.revoked = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl AccessRequestRepository for InMemoryAccessStore {
    async fn create_access_request(&self, request: NewAccessRequest) -> AppResult<AccessRequest> {
        let mut state = self.state.write().await;
        if !state.datasets.contains_key(&request.dataset_id) {
            return Err(AppError::NotFound(format!(
                "dataset '{}' was not found",
                request.dataset_id
            )));
        }

        let request = AccessRequest {
            id: Uuid::new_v4(),
            dataset_id: request.dataset_id,
            subject: request.subject,
            owner: request.owner,
            created: Utc::now(),
            status: AccessRequestStatus::Pending,
            closed: None,
            expires: request.expires,
            granter: None,
            reason: None,
            documentation_id: request.documentation_id,
        };
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_access_request(&self, request_id: Uuid) -> AppResult<Option<AccessRequest>> {
        Ok(self.state.read().await.requests.get(&request_id).cloned())
    }

    async fn list_access_requests_for_dataset(
        &self,
        dataset_id: Uuid,
    ) -> AppResult<Vec<AccessRequest>> {
        let state = self.state.read().await;
        let mut requests: Vec<AccessRequest> = state
            .requests
            .values()
            .filter(|request| request.dataset_id == dataset_id)
            .cloned()
            .collect();
        requests.sort_by(|left, right| right.created.cmp(&left.created));
        Ok(requests)
    }

    async fn list_pending_access_requests_for_owners(
        &self,
        owners: &[String],
    ) -> AppResult<Vec<AccessRequest>> {
        let state = self.state.read().await;
        let mut requests: Vec<AccessRequest> = state
            .requests
            .values()
            .filter(|request| {
                request.status == AccessRequestStatus::Pending && owners.contains(&request.owner)
            })
            .cloned()
            .collect();
        requests.sort_by(|left, right| right.created.cmp(&left.created));
        Ok(requests)
    }

    async fn update_access_request(
        &self,
        input: UpdateAccessRequestInput,
    ) -> AppResult<AccessRequest> {
        let mut state = self.state.write().await;
        let mut request = state.pending_request(input.id)?.clone();
        request.owner = input.owner;
        request.expires = input.expires;
        request.documentation_id = input.documentation_id;
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn delete_access_request(&self, request_id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.pending_request(request_id)?;
        state.requests.remove(&request_id);
        Ok(())
    }

    async fn approve_access_request(&self, request_id: Uuid, granter: &str) -> AppResult<Access> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut request = state
            .requests
            .get(&request_id)
            .cloned()
            .ok_or_else(|| {
                AppError::NotFound(format!("access request '{request_id}' was not found"))
            })?;

        let mut staged_access = state.access.clone();
        let access = replace_open_access(
            &mut staged_access,
            GrantAccessInput {
                dataset_id: request.dataset_id,
                subject: request.subject.clone(),
                expires: request.expires,
                granter: granter.to_owned(),
            },
            Some(request_id),
            now,
        );

        request.ensure_pending()?;
        request.status = AccessRequestStatus::Approved;
        request.granter = Some(granter.to_owned());
        request.closed = Some(now);

        state.access = staged_access;
        state.requests.insert(request_id, request);
        Ok(access)
    }

    async fn deny_access_request(
        &self,
        request_id: Uuid,
        granter: &str,
        reason: Option<&str>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let mut request = state.pending_request(request_id)?.clone();
        request.status = AccessRequestStatus::Denied;
        request.granter = Some(granter.to_owned());
        request.reason = reason.map(str::to_owned);
        request.closed = Some(Utc::now());
        state.requests.insert(request_id, request);
        Ok(())
    }
}

#[async_trait]
impl JoinableViewRepository for InMemoryAccessStore {
    async fn create_joinable_view(
        &self,
        input: CreateJoinableViewInput,
    ) -> AppResult<JoinableView> {
        let mut state = self.state.write().await;
        if let Some(missing) = input
            .datasource_ids
            .iter()
            .find(|datasource_id| !state.datasources.contains_key(datasource_id))
        {
            return Err(AppError::NotFound(format!(
                "datasource '{missing}' was not found"
            )));
        }

        let view = JoinableView {
            id: Uuid::new_v4(),
            name: input.name,
            owner: input.owner,
            created: Utc::now(),
            expires: input.expires,
            deleted: None,
        };
        state.views.insert(view.id, view.clone());
        for datasource_id in input.datasource_ids {
            state.view_sources.push(JoinableViewDatasource {
                joinable_view_id: view.id,
                datasource_id,
            });
        }
        Ok(view)
    }

    async fn list_joinable_views_for_owner(&self, owner: &str) -> AppResult<Vec<JoinableView>> {
        let state = self.state.read().await;
        let mut views: Vec<JoinableView> = state
            .views
            .values()
            .filter(|view| view.owner == owner && view.deleted.is_none())
            .cloned()
            .collect();
        views.sort_by(|left, right| right.created.cmp(&left.created));
        Ok(views)
    }

    async fn list_expired_joinable_views(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<JoinableView>> {
        let state = self.state.read().await;
        let mut views: Vec<JoinableView> = state
            .views
            .values()
            .filter(|view| view.deleted.is_none() && view.is_expired(now))
            .cloned()
            .collect();
        views.sort_by_key(|view| view.expires);
        Ok(views)
    }

    async fn list_joinable_views_with_reference(
        &self,
    ) -> AppResult<Vec<JoinableViewWithReference>> {
        let state = self.state.read().await;
        Ok(state
            .view_sources
            .iter()
            .filter_map(|link| {
                let view = state
                    .views
                    .get(&link.joinable_view_id)
                    .filter(|view| view.deleted.is_none())?;
                let source = state.live_datasource(link.datasource_id)?;
                Some(JoinableViewWithReference {
                    view: view.clone(),
                    dataset_id: source.dataset_id,
                    pseudo_source: source.coordinates.clone(),
                })
            })
            .collect())
    }

    async fn list_joinable_views_for_reference_and_owner(
        &self,
        owner: &str,
        dataset_id: Uuid,
    ) -> AppResult<Vec<JoinableView>> {
        let mut seen = HashSet::new();
        Ok(self
            .list_joinable_views_with_reference()
            .await?
            .into_iter()
            .filter(|row| row.view.owner == owner && row.dataset_id == dataset_id)
            .map(|row| row.view)
            .filter(|view| seen.insert(view.id))
            .collect())
    }

    async fn list_joinable_views_for_datasource(
        &self,
        datasource_id: Uuid,
    ) -> AppResult<Vec<JoinableView>> {
        let state = self.state.read().await;
        Ok(state
            .view_sources
            .iter()
            .filter(|link| link.datasource_id == datasource_id)
            .filter_map(|link| state.views.get(&link.joinable_view_id))
            .filter(|view| view.deleted.is_none())
            .cloned()
            .collect())
    }

    async fn set_joinable_view_deleted(&self, joinable_view_id: Uuid) -> AppResult<()> {
        let mut state = self.state.write().await;
        if let Some(view) = state
            .views
            .get_mut(&joinable_view_id)
            .filter(|view| view.deleted.is_none())
        {
            view.deleted = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl DatasetRepository for InMemoryAccessStore {
    async fn find_dataset(&self, dataset_id: Uuid) -> AppResult<Option<Dataset>> {
        Ok(self.state.read().await.datasets.get(&dataset_id).cloned())
    }

    async fn find_bigquery_datasource(
        &self,
        dataset_id: Uuid,
        is_reference: bool,
    ) -> AppResult<Option<BigQueryDatasource>> {
        let state = self.state.read().await;
        Ok(state
            .datasources
            .keys()
            .filter_map(|datasource_id| state.live_datasource(*datasource_id))
            .find(|datasource| {
                datasource.dataset_id == dataset_id && datasource.is_reference == is_reference
            })
            .cloned())
    }

    async fn list_orphaned_pseudo_datasources(&self) -> AppResult<Vec<BigQueryDatasource>> {
        let state = self.state.read().await;
        Ok(state
            .datasources
            .keys()
            .filter_map(|datasource_id| state.live_datasource(*datasource_id))
            .filter(|datasource| {
                !datasource.is_reference && !state.datasets.contains_key(&datasource.dataset_id)
            })
            .cloned()
            .collect())
    }

    async fn set_datasource_deleted(&self, datasource_id: Uuid) -> AppResult<()> {
        if let Some(stored) = self.state.write().await.datasources.get_mut(&datasource_id) {
            stored.deleted = true;
        }
        Ok(())
    }
}

#[async_trait]
impl AuditRepository for InMemoryAccessStore {
    async fn append_event(&self, mut event: AccessAuditEvent) -> AppResult<()> {
        event.created.get_or_insert_with(Utc::now);
        self.state.write().await.events.push(event);
        Ok(())
    }

    async fn list_events_for_dataset(
        &self,
        dataset_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<AccessAuditEvent>> {
        Ok(self
            .state
            .read()
            .await
            .events
            .iter()
            .rev()
            .filter(|event| event.dataset_id == Some(dataset_id))
            .take(limit)
            .cloned()
            .collect())
    }
}
