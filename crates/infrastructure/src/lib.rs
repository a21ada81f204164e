//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod gcp;
mod in_memory_access_store;
mod noop_backends;
mod postgres_access_repository;
mod postgres_audit_repository;
mod postgres_dataset_repository;
mod postgres_joinable_view_repository;
mod redis_reconciler_lease_coordinator;

#[cfg(test)]
mod test_database;

pub use gcp::{
    BigQueryIamGrantBackend, BigQueryWarehouseBackend, GcpRestClient, GcpTokenSource,
    GoogleGroupsDirectory,
};
pub use in_memory_access_store::InMemoryAccessStore;
pub use noop_backends::{NoopDirectoryBackend, NoopGrantBackend, NoopWarehouseBackend};
pub use postgres_access_repository::PostgresAccessRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_dataset_repository::PostgresDatasetRepository;
pub use postgres_joinable_view_repository::PostgresJoinableViewRepository;
pub use redis_reconciler_lease_coordinator::RedisReconcilerLeaseCoordinator;
