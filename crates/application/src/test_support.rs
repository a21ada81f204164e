//! In-process fakes behind the access ports, shared by the service tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use grantkeeper_core::{AppError, AppResult, UserIdentity};
use grantkeeper_domain::{
    Access, AccessRequest, AccessRequestStatus, BigQueryCoordinates, BigQueryDatasource, Dataset,
    JoinableView, JoinableViewDatasource, JoinableViewWithReference, PiiLevel, Subject,
};

use crate::access_ports::{
    AccessAuditEvent, AccessBackends, AccessRepositories, AccessRepository,
    AccessRequestRepository, AuditRepository, CreateJoinableViewInput, DatasetRepository,
    DirectoryBackend, DirectoryGroup, GrantAccessInput, GrantBackend, JoinableViewRepository,
    JoinableViewSource, JoinableViewsCreated, NewAccessRequest, UpdateAccessRequestInput,
    WarehouseBackend,
};

pub(crate) const OWNER_GROUP: &str = "team-owners@example.com";
pub(crate) const CENTRAL_PROJECT: &str = "central-data";

pub(crate) fn owner() -> UserIdentity {
    UserIdentity::new("owner@example.com", "Dataset Owner")
}

pub(crate) fn requester() -> UserIdentity {
    UserIdentity::new("alice@example.com", "Alice")
}

#[derive(Default)]
struct StoreState {
    datasets: Vec<Dataset>,
    datasources: Vec<(BigQueryDatasource, bool)>,
    access: Vec<Access>,
    requests: Vec<AccessRequest>,
    views: Vec<JoinableView>,
    view_sources: Vec<JoinableViewDatasource>,
    events: Vec<AccessAuditEvent>,
}

/// Single-lock store so every composite write is atomic.
#[derive(Default)]
pub(crate) struct FakeStore {
    state: Mutex<StoreState>,
    writes: AtomicUsize,
    audit_unavailable: AtomicBool,
}

impl FakeStore {
    pub(crate) fn repositories(self: &Arc<Self>) -> AccessRepositories {
        AccessRepositories {
            access: self.clone(),
            requests: self.clone(),
            datasets: self.clone(),
            joinable_views: self.clone(),
            audit: self.clone(),
        }
    }

    /// Seeds a dataset owned by [`OWNER_GROUP`] with a plain primary datasource.
    pub(crate) async fn seed_dataset(&self, pii: PiiLevel) -> Dataset {
        self.seed_dataset_with_columns(pii, Vec::new()).await
    }

    /// Seeds a dataset whose primary datasource is a pseudonymized view over
    /// a reference table.
    pub(crate) async fn seed_pseudonymized_dataset(&self) -> Dataset {
        let dataset = self
            .seed_dataset_with_columns(PiiLevel::Sensitive, vec!["fnr".to_owned()])
            .await;
        let table = format!("plain_{}", dataset.id.simple());
        self.state.lock().await.datasources.push((
            BigQueryDatasource {
                id: Uuid::new_v4(),
                dataset_id: dataset.id,
                coordinates: BigQueryCoordinates::new("team-prod", "raw", table),
                pseudo_columns: Vec::new(),
                is_reference: true,
            },
            false,
        ));
        dataset
    }

    async fn seed_dataset_with_columns(&self, pii: PiiLevel, pseudo_columns: Vec<String>) -> Dataset {
        let dataset = Dataset {
            id: Uuid::new_v4(),
            name: "persons".to_owned(),
            owner_group: OWNER_GROUP.to_owned(),
            pii,
        };
        let table = format!("table_{}", dataset.id.simple());
        let mut state = self.state.lock().await;
        state.datasets.push(dataset.clone());
        state.datasources.push((
            BigQueryDatasource {
                id: Uuid::new_v4(),
                dataset_id: dataset.id,
                coordinates: BigQueryCoordinates::new("team-prod", "markedsplassen", table),
                pseudo_columns,
                is_reference: false,
            },
            false,
        ));
        dataset
    }

    pub(crate) async fn remove_dataset(&self, dataset_id: Uuid) {
        self.state
            .lock()
            .await
            .datasets
            .retain(|dataset| dataset.id != dataset_id);
    }

    pub(crate) async fn seed_access(
        &self,
        dataset_id: Uuid,
        subject: &str,
        expires: Option<DateTime<Utc>>,
    ) -> Access {
        let access = Access {
            id: Uuid::new_v4(),
            dataset_id,
            subject: subject.to_owned(),
            granter: "owner@example.com".to_owned(),
            expires,
            created: Utc::now() - Duration::days(1),
            revoked: None,
            access_request_id: None,
        };
        self.state.lock().await.access.push(access.clone());
        access
    }

    pub(crate) async fn seed_joinable_view(
        &self,
        owner: &str,
        expires: Option<DateTime<Utc>>,
        dataset_id: Uuid,
    ) -> JoinableView {
        let view = JoinableView {
            id: Uuid::new_v4(),
            name: format!("{}_joined", owner.split('@').next().unwrap_or(owner)),
            owner: owner.to_owned(),
            created: Utc::now() - Duration::days(1),
            expires,
            deleted: None,
        };
        let mut state = self.state.lock().await;
        let datasource_id = state
            .datasources
            .iter()
            .find(|(datasource, _)| datasource.dataset_id == dataset_id && !datasource.is_reference)
            .map(|(datasource, _)| datasource.id)
            .unwrap_or_else(|| unreachable!());
        state.views.push(view.clone());
        state.view_sources.push(JoinableViewDatasource {
            joinable_view_id: view.id,
            datasource_id,
        });
        view
    }

    pub(crate) async fn access_rows(&self) -> Vec<Access> {
        self.state.lock().await.access.clone()
    }

    pub(crate) async fn access_row(&self, access_id: Uuid) -> Access {
        self.state
            .lock()
            .await
            .access
            .iter()
            .find(|access| access.id == access_id)
            .cloned()
            .unwrap_or_else(|| unreachable!())
    }

    pub(crate) async fn request(&self, request_id: Uuid) -> Option<AccessRequest> {
        self.state
            .lock()
            .await
            .requests
            .iter()
            .find(|request| request.id == request_id)
            .cloned()
    }

    pub(crate) async fn view(&self, view_id: Uuid) -> JoinableView {
        self.state
            .lock()
            .await
            .views
            .iter()
            .find(|view| view.id == view_id)
            .cloned()
            .unwrap_or_else(|| unreachable!())
    }

    pub(crate) async fn datasource_deleted(&self, datasource_id: Uuid) -> bool {
        self.state
            .lock()
            .await
            .datasources
            .iter()
            .any(|(datasource, deleted)| datasource.id == datasource_id && *deleted)
    }

    pub(crate) async fn primary_datasource(&self, dataset_id: Uuid) -> BigQueryDatasource {
        self.state
            .lock()
            .await
            .datasources
            .iter()
            .find(|(datasource, _)| datasource.dataset_id == dataset_id && !datasource.is_reference)
            .map(|(datasource, _)| datasource.clone())
            .unwrap_or_else(|| unreachable!())
    }

    pub(crate) async fn events(&self) -> Vec<AccessAuditEvent> {
        self.state.lock().await.events.clone()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes every following audit append fail.
    pub(crate) fn fail_audit(&self) {
        self.audit_unavailable.store(true, Ordering::SeqCst);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn close_open_access(state: &mut StoreState, dataset_id: Uuid, subject: &str, now: DateTime<Utc>) {
    for access in state
        .access
        .iter_mut()
        .filter(|access| access.dataset_id == dataset_id && access.subject == subject)
        .filter(|access| access.revoked.is_none())
    {
        access.revoked = Some(now);
    }
}

fn pending_request_mut(state: &mut StoreState, request_id: Uuid) -> AppResult<&mut AccessRequest> {
    let request = state
        .requests
        .iter_mut()
        .find(|request| request.id == request_id)
        .ok_or_else(|| AppError::NotFound(format!("access request '{request_id}' not found")))?;
    request.ensure_pending()?;
    Ok(request)
}

#[async_trait]
impl AccessRepository for FakeStore {
    async fn find_access(&self, access_id: Uuid) -> AppResult<Option<Access>> {
        Ok(self
            .state
            .lock()
            .await
            .access
            .iter()
            .find(|access| access.id == access_id)
            .cloned())
    }

    async fn list_unrevoked_expired_access(&self, now: DateTime<Utc>) -> AppResult<Vec<Access>> {
        Ok(self
            .state
            .lock()
            .await
            .access
            .iter()
            .filter(|access| access.is_expired_unrevoked(now))
            .cloned()
            .collect())
    }

    async fn list_active_access(&self, now: DateTime<Utc>) -> AppResult<Vec<Access>> {
        Ok(self
            .state
            .lock()
            .await
            .access
            .iter()
            .filter(|access| access.is_active(now))
            .cloned()
            .collect())
    }

    async fn list_active_access_for_dataset(
        &self,
        dataset_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Access>> {
        Ok(self
            .state
            .lock()
            .await
            .access
            .iter()
            .filter(|access| access.dataset_id == dataset_id && access.is_active(now))
            .cloned()
            .collect())
    }

    async fn grant_access(&self, input: GrantAccessInput) -> AppResult<Access> {
        self.record_write();
        let now = Utc::now();
        let mut state = self.state.lock().await;
        close_open_access(&mut state, input.dataset_id, input.subject.as_str(), now);
        let access = Access {
            id: Uuid::new_v4(),
            dataset_id: input.dataset_id,
            subject: input.subject,
            granter: input.granter,
            expires: input.expires,
            created: now,
            revoked: None,
            access_request_id: None,
        };
        state.access.push(access.clone());
        Ok(access)
    }

    async fn revoke_access(&self, access_id: Uuid) -> AppResult<()> {
        self.record_write();
        let mut state = self.state.lock().await;
        let access = state
            .access
            .iter_mut()
            .find(|access| access.id == access_id && access.revoked.is_none())
            .ok_or_else(|| AppError::NotFound(format!("open access '{access_id}' not found")))?;
        access.revoked = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl AccessRequestRepository for FakeStore {
    async fn create_access_request(&self, request: NewAccessRequest) -> AppResult<AccessRequest> {
        self.record_write();
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
        self.state.lock().await.requests.push(request.clone());
        Ok(request)
    }

    async fn find_access_request(&self, request_id: Uuid) -> AppResult<Option<AccessRequest>> {
        Ok(self.request(request_id).await)
    }

    async fn list_access_requests_for_dataset(
        &self,
        dataset_id: Uuid,
    ) -> AppResult<Vec<AccessRequest>> {
        Ok(self
            .state
            .lock()
            .await
            .requests
            .iter()
            .filter(|request| request.dataset_id == dataset_id)
            .cloned()
            .collect())
    }

    async fn list_pending_access_requests_for_owners(
        &self,
        owners: &[String],
    ) -> AppResult<Vec<AccessRequest>> {
        Ok(self
            .state
            .lock()
            .await
            .requests
            .iter()
            .filter(|request| request.status == AccessRequestStatus::Pending)
            .filter(|request| owners.contains(&request.owner))
            .cloned()
            .collect())
    }

    async fn update_access_request(
        &self,
        input: UpdateAccessRequestInput,
    ) -> AppResult<AccessRequest> {
        self.record_write();
        let mut state = self.state.lock().await;
        let request = pending_request_mut(&mut state, input.id)?;
        request.owner = input.owner;
        request.expires = input.expires;
        request.documentation_id = input.documentation_id;
        Ok(request.clone())
    }

    async fn delete_access_request(&self, request_id: Uuid) -> AppResult<()> {
        self.record_write();
        let mut state = self.state.lock().await;
        pending_request_mut(&mut state, request_id)?;
        state.requests.retain(|request| request.id != request_id);
        Ok(())
    }

    async fn approve_access_request(&self, request_id: Uuid, granter: &str) -> AppResult<Access> {
        self.record_write();
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let request = pending_request_mut(&mut state, request_id)?.clone();

        close_open_access(&mut state, request.dataset_id, request.subject.as_str(), now);
        let access = Access {
            id: Uuid::new_v4(),
            dataset_id: request.dataset_id,
            subject: request.subject.clone(),
            granter: granter.to_owned(),
            expires: request.expires,
            created: now,
            revoked: None,
            access_request_id: Some(request.id),
        };
        state.access.push(access.clone());

        let request = pending_request_mut(&mut state, request_id)?;
        request.status = AccessRequestStatus::Approved;
        request.granter = Some(granter.to_owned());
        request.closed = Some(now);
        Ok(access)
    }

    async fn deny_access_request(
        &self,
        request_id: Uuid,
        granter: &str,
        reason: Option<&str>,
    ) -> AppResult<()> {
        self.record_write();
        let mut state = self.state.lock().await;
        let request = pending_request_mut(&mut state, request_id)?;
        request.status = AccessRequestStatus::Denied;
        request.granter = Some(granter.to_owned());
        request.reason = reason.map(str::to_owned);
        request.closed = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl JoinableViewRepository for FakeStore {
    async fn create_joinable_view(
        &self,
        input: CreateJoinableViewInput,
    ) -> AppResult<JoinableView> {
        self.record_write();
        let view = JoinableView {
            id: Uuid::new_v4(),
            name: input.name,
            owner: input.owner,
            created: Utc::now(),
            expires: input.expires,
            deleted: None,
        };
        let mut state = self.state.lock().await;
        state.views.push(view.clone());
        state
            .view_sources
            .extend(input.datasource_ids.into_iter().map(|datasource_id| {
                JoinableViewDatasource {
                    joinable_view_id: view.id,
                    datasource_id,
                }
            }));
        Ok(view)
    }

    async fn list_joinable_views_for_owner(&self, owner: &str) -> AppResult<Vec<JoinableView>> {
        Ok(self
            .state
            .lock()
            .await
            .views
            .iter()
            .filter(|view| view.owner == owner && view.deleted.is_none())
            .cloned()
            .collect())
    }

    async fn list_expired_joinable_views(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<JoinableView>> {
        Ok(self
            .state
            .lock()
            .await
            .views
            .iter()
            .filter(|view| view.deleted.is_none() && view.is_expired(now))
            .cloned()
            .collect())
    }

    async fn list_joinable_views_with_reference(
        &self,
    ) -> AppResult<Vec<JoinableViewWithReference>> {
        let state = self.state.lock().await;
        let mut rows = Vec::new();
        for link in &state.view_sources {
            let view = state
                .views
                .iter()
                .find(|view| view.id == link.joinable_view_id && view.deleted.is_none());
            let source = state
                .datasources
                .iter()
                .find(|(datasource, deleted)| datasource.id == link.datasource_id && !deleted);
            if let (Some(view), Some((source, _))) = (view, source) {
                rows.push(JoinableViewWithReference {
                    view: view.clone(),
                    dataset_id: source.dataset_id,
                    pseudo_source: source.coordinates.clone(),
                });
            }
        }
        Ok(rows)
    }

    async fn list_joinable_views_for_reference_and_owner(
        &self,
        owner: &str,
        dataset_id: Uuid,
    ) -> AppResult<Vec<JoinableView>> {
        Ok(self
            .list_joinable_views_with_reference()
            .await?
            .into_iter()
            .filter(|row| row.view.owner == owner && row.dataset_id == dataset_id)
            .map(|row| row.view)
            .collect())
    }

    async fn list_joinable_views_for_datasource(
        &self,
        datasource_id: Uuid,
    ) -> AppResult<Vec<JoinableView>> {
        let state = self.state.lock().await;
        Ok(state
            .view_sources
            .iter()
            .filter(|link| link.datasource_id == datasource_id)
            .filter_map(|link| {
                state
                    .views
                    .iter()
                    .find(|view| view.id == link.joinable_view_id && view.deleted.is_none())
                    .cloned()
            })
            .collect())
    }

    async fn set_joinable_view_deleted(&self, joinable_view_id: Uuid) -> AppResult<()> {
        self.record_write();
        let mut state = self.state.lock().await;
        if let Some(view) = state.views.iter_mut().find(|view| view.id == joinable_view_id) {
            view.deleted = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl DatasetRepository for FakeStore {
    async fn find_dataset(&self, dataset_id: Uuid) -> AppResult<Option<Dataset>> {
        Ok(self
            .state
            .lock()
            .await
            .datasets
            .iter()
            .find(|dataset| dataset.id == dataset_id)
            .cloned())
    }

    async fn find_bigquery_datasource(
        &self,
        dataset_id: Uuid,
        is_reference: bool,
    ) -> AppResult<Option<BigQueryDatasource>> {
        Ok(self
            .state
            .lock()
            .await
            .datasources
            .iter()
            .find(|(datasource, deleted)| {
                datasource.dataset_id == dataset_id
                    && datasource.is_reference == is_reference
                    && !deleted
            })
            .map(|(datasource, _)| datasource.clone()))
    }

    async fn list_orphaned_pseudo_datasources(&self) -> AppResult<Vec<BigQueryDatasource>> {
        let state = self.state.lock().await;
        Ok(state
            .datasources
            .iter()
            .filter(|(datasource, deleted)| {
                !deleted
                    && !datasource.is_reference
                    && !state
                        .datasets
                        .iter()
                        .any(|dataset| dataset.id == datasource.dataset_id)
            })
            .map(|(datasource, _)| datasource.clone())
            .collect())
    }

    async fn set_datasource_deleted(&self, datasource_id: Uuid) -> AppResult<()> {
        self.record_write();
        let mut state = self.state.lock().await;
        if let Some((_, deleted)) = state
            .datasources
            .iter_mut()
            .find(|(datasource, _)| datasource.id == datasource_id)
        {
            *deleted = true;
        }
        Ok(())
    }
}

#[async_trait]
impl AuditRepository for FakeStore {
    async fn append_event(&self, event: AccessAuditEvent) -> AppResult<()> {
        if self.audit_unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Internal("audit log unavailable".to_owned()));
        }
        self.record_write();
        self.state.lock().await.events.push(event);
        Ok(())
    }

    async fn list_events_for_dataset(
        &self,
        dataset_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<AccessAuditEvent>> {
        Ok(self
            .state
            .lock()
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

/// External IAM call recorded by [`FakeGrantBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GrantCall {
    Grant(String, String),
    Revoke(String, String),
}

/// IAM fake that tracks bindings and fails for selected subjects.
#[derive(Default)]
pub(crate) struct FakeGrantBackend {
    bindings: Mutex<HashSet<(String, String)>>,
    calls: Mutex<Vec<GrantCall>>,
    failing_subjects: Mutex<HashSet<String>>,
    checks: AtomicUsize,
}

impl FakeGrantBackend {
    pub(crate) async fn bind(&self, resource: &BigQueryCoordinates, subject: &str) {
        self.bindings
            .lock()
            .await
            .insert((resource.to_string(), subject.to_owned()));
    }

    pub(crate) async fn fail_for(&self, subject: &str) {
        self.failing_subjects.lock().await.insert(subject.to_owned());
    }

    pub(crate) async fn calls(&self) -> Vec<GrantCall> {
        self.calls.lock().await.clone()
    }

    pub(crate) async fn is_bound(&self, resource: &BigQueryCoordinates, subject: &str) -> bool {
        self.bindings
            .lock()
            .await
            .contains(&(resource.to_string(), subject.to_owned()))
    }

    pub(crate) fn check_count(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    async fn ensure_not_failing(&self, subject: &Subject) -> AppResult<()> {
        if self
            .failing_subjects
            .lock()
            .await
            .contains(&subject.to_string())
        {
            return Err(AppError::Upstream(format!("iam rejected '{subject}'")));
        }
        Ok(())
    }
}

#[async_trait]
impl GrantBackend for FakeGrantBackend {
    async fn grant(
        &self,
        resource: &BigQueryCoordinates,
        subject: &Subject,
        _expires: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        self.calls
            .lock()
            .await
            .push(GrantCall::Grant(resource.to_string(), subject.to_string()));
        self.ensure_not_failing(subject).await?;
        self.bind(resource, subject.to_string().as_str()).await;
        Ok(())
    }

    async fn revoke(&self, resource: &BigQueryCoordinates, subject: &Subject) -> AppResult<()> {
        self.calls
            .lock()
            .await
            .push(GrantCall::Revoke(resource.to_string(), subject.to_string()));
        self.ensure_not_failing(subject).await?;
        self.bindings
            .lock()
            .await
            .remove(&(resource.to_string(), subject.to_string()));
        Ok(())
    }

    async fn check_access(
        &self,
        resource: &BigQueryCoordinates,
        subject: &Subject,
    ) -> AppResult<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.is_bound(resource, subject.to_string().as_str()).await)
    }
}

/// Warehouse fake recording every drop and create.
#[derive(Default)]
pub(crate) struct FakeWarehouseBackend {
    pub(crate) deleted_datasets: Mutex<Vec<String>>,
    pub(crate) deleted_joinable_views: Mutex<Vec<(String, String)>>,
    pub(crate) deleted_pseudo_views: Mutex<Vec<String>>,
    pub(crate) failing_datasets: Mutex<HashSet<String>>,
}

#[async_trait]
impl WarehouseBackend for FakeWarehouseBackend {
    async fn delete_joinable_dataset(&self, name: &str) -> AppResult<()> {
        if self.failing_datasets.lock().await.contains(name) {
            return Err(AppError::Upstream(format!("cannot delete dataset '{name}'")));
        }
        self.deleted_datasets.lock().await.push(name.to_owned());
        Ok(())
    }

    async fn delete_joinable_view(
        &self,
        name: &str,
        pseudo_source: &BigQueryCoordinates,
    ) -> AppResult<()> {
        self.deleted_joinable_views
            .lock()
            .await
            .push((name.to_owned(), pseudo_source.to_string()));
        Ok(())
    }

    async fn delete_pseudo_view(&self, coordinates: &BigQueryCoordinates) -> AppResult<()> {
        self.deleted_pseudo_views
            .lock()
            .await
            .push(coordinates.to_string());
        Ok(())
    }

    async fn create_joinable_views_for_user(
        &self,
        name: &str,
        sources: &[JoinableViewSource],
    ) -> AppResult<JoinableViewsCreated> {
        let dataset = format!("{name}_1");
        Ok(JoinableViewsCreated {
            views: sources
                .iter()
                .map(|source| {
                    BigQueryCoordinates::new(
                        CENTRAL_PROJECT,
                        dataset.as_str(),
                        grantkeeper_domain::joinable_view_name(&source.pseudo),
                    )
                })
                .collect(),
            dataset,
        })
    }
}

/// Directory fake with a fixed membership list.
#[derive(Default)]
pub(crate) struct FakeDirectory {
    memberships: Mutex<Vec<(String, String)>>,
}

impl FakeDirectory {
    pub(crate) async fn add_member(&self, email: &str, group: &str) {
        self.memberships
            .lock()
            .await
            .push((email.to_owned(), group.to_owned()));
    }
}

#[async_trait]
impl DirectoryBackend for FakeDirectory {
    async fn groups_for_subject(&self, subject: &Subject) -> AppResult<Vec<DirectoryGroup>> {
        Ok(self
            .memberships
            .lock()
            .await
            .iter()
            .filter(|(email, _)| email == subject.identifier())
            .map(|(_, group)| DirectoryGroup {
                email: group.clone(),
                name: group.clone(),
            })
            .collect())
    }
}

/// Fakes wired together the way the worker wires the real adapters.
pub(crate) struct Harness {
    pub(crate) store: Arc<FakeStore>,
    pub(crate) grants: Arc<FakeGrantBackend>,
    pub(crate) warehouse: Arc<FakeWarehouseBackend>,
    pub(crate) directory: Arc<FakeDirectory>,
}

impl Harness {
    /// Creates fakes where [`owner`] belongs to [`OWNER_GROUP`].
    pub(crate) async fn new() -> Self {
        let directory = Arc::new(FakeDirectory::default());
        directory
            .add_member(owner().email(), OWNER_GROUP)
            .await;
        Self {
            store: Arc::new(FakeStore::default()),
            grants: Arc::new(FakeGrantBackend::default()),
            warehouse: Arc::new(FakeWarehouseBackend::default()),
            directory,
        }
    }

    pub(crate) fn repositories(&self) -> AccessRepositories {
        self.store.repositories()
    }

    pub(crate) fn backends(&self) -> AccessBackends {
        AccessBackends {
            grant: self.grants.clone(),
            warehouse: self.warehouse.clone(),
            directory: self.directory.clone(),
        }
    }
}
