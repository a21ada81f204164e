use std::sync::Arc;

mod audit;
mod backends;
mod inputs;
mod lease;
mod repositories;

pub use audit::{AccessAuditEvent, AuditRepository};
pub use backends::{
    DirectoryBackend, DirectoryGroup, GrantBackend, JoinableViewSource, JoinableViewsCreated,
    WarehouseBackend,
};
pub use inputs::{
    CreateAccessRequestInput, CreateJoinableViewInput, CreateJoinableViewsInput,
    GrantAccessInput, GrantAccessToDatasetInput, NewAccessRequest, UpdateAccessRequestInput,
};
pub use lease::{ReconcilerLease, ReconcilerLeaseCoordinator};
pub use repositories::{
    AccessRepository, AccessRequestRepository, DatasetRepository, JoinableViewRepository,
};

/// Store ports shared by the access workflow and the reconcilers.
#[derive(Clone)]
pub struct AccessRepositories {
    /// Access grants.
    pub access: Arc<dyn AccessRepository>,
    /// Access requests.
    pub requests: Arc<dyn AccessRequestRepository>,
    /// Dataset catalog.
    pub datasets: Arc<dyn DatasetRepository>,
    /// Joinable views.
    pub joinable_views: Arc<dyn JoinableViewRepository>,
    /// Access history.
    pub audit: Arc<dyn AuditRepository>,
}

/// External systems the access workflow and the reconcilers act on.
#[derive(Clone)]
pub struct AccessBackends {
    /// IAM grants.
    pub grant: Arc<dyn GrantBackend>,
    /// Warehouse views.
    pub warehouse: Arc<dyn WarehouseBackend>,
    /// Group memberships.
    pub directory: Arc<dyn DirectoryBackend>,
}
