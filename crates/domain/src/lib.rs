//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access;
mod audit;
mod dataset;
mod joinable_view;
mod subject;

pub use access::{Access, AccessRequest, AccessRequestStatus, validate_expiry};
pub use audit::AccessAuditAction;
pub use dataset::{BigQueryCoordinates, BigQueryDatasource, Dataset, PiiLevel};
pub use joinable_view::{
    JoinableView, JoinableViewDatasource, JoinableViewWithReference, joinable_view_name,
};
pub use subject::{Subject, SubjectType};

/// Subject recorded as actor for changes made by the reconcilers.
pub const RECONCILER_ACTOR: &str = "system:access-reconciler";
