//! Application services and ports.

#![forbid(unsafe_code)]

mod access_ports;
mod access_reconciler;
mod access_service;
mod joinable_view_reconciler;
mod reconcile_metrics;
mod reconciler_loop;

#[cfg(test)]
mod test_support;

pub use access_ports::{
    AccessAuditEvent, AccessBackends, AccessRepositories, AccessRepository,
    AccessRequestRepository, AuditRepository, CreateAccessRequestInput, CreateJoinableViewInput,
    CreateJoinableViewsInput, DatasetRepository, DirectoryBackend, DirectoryGroup,
    GrantAccessInput, GrantAccessToDatasetInput, GrantBackend, JoinableViewRepository,
    JoinableViewSource, JoinableViewsCreated, NewAccessRequest, ReconcilerLease,
    ReconcilerLeaseCoordinator, UpdateAccessRequestInput, WarehouseBackend,
};
pub use access_reconciler::{AccessReconcileReport, AccessReconciler};
pub use access_service::AccessService;
pub use joinable_view_reconciler::{JoinableViewReconcileReport, JoinableViewReconciler};
pub use reconciler_loop::{CycleOutcome, ReconcilerLoop, ReconciliationCycle};
