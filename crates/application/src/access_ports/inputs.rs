use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Caller-facing payload for requesting access to a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAccessRequestInput {
    /// Requested dataset.
    pub dataset_id: Uuid,
    /// Identifier of the subject to grant; defaults to the caller's email.
    pub subject: Option<String>,
    /// Subject type (`user`, `group`, `serviceAccount`); defaults to `user`.
    pub subject_type: Option<String>,
    /// Owning group email; the caller owns the request when absent.
    pub owner_group: Option<String>,
    /// Desired expiry of the grant.
    pub expires: Option<DateTime<Utc>>,
    /// Linked documentation record.
    pub documentation_id: Option<Uuid>,
}

/// Validated request row handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccessRequest {
    /// Requested dataset.
    pub dataset_id: Uuid,
    /// Subject in `type:identifier` form.
    pub subject: String,
    /// Owner in `type:identifier` form.
    pub owner: String,
    /// Desired expiry of the grant.
    pub expires: Option<DateTime<Utc>>,
    /// Linked documentation record.
    pub documentation_id: Option<Uuid>,
}

/// Changes to a pending access request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateAccessRequestInput {
    /// Request to update.
    pub id: Uuid,
    /// New owner in `type:identifier` form.
    pub owner: String,
    /// New desired expiry.
    pub expires: Option<DateTime<Utc>>,
    /// New documentation link.
    pub documentation_id: Option<Uuid>,
}

/// A grant written by direct grant or request approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantAccessInput {
    /// Dataset to grant.
    pub dataset_id: Uuid,
    /// Subject in `type:identifier` form.
    pub subject: String,
    /// Expiry, `None` for perpetual access.
    pub expires: Option<DateTime<Utc>>,
    /// Subject authorising the grant.
    pub granter: String,
}

/// Joinable view row plus the pseudonymized datasources it joins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJoinableViewInput {
    /// View name, also the joinable dataset id.
    pub name: String,
    /// Owner email.
    pub owner: String,
    /// Expiry of the view.
    pub expires: Option<DateTime<Utc>>,
    /// Pseudonymized datasource ids.
    pub datasource_ids: Vec<Uuid>,
}

/// Caller-facing payload for a direct grant by a dataset owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantAccessToDatasetInput {
    /// Dataset to grant.
    pub dataset_id: Uuid,
    /// Identifier of the grantee; defaults to the caller's email.
    pub subject: Option<String>,
    /// Subject type; defaults to `user`.
    pub subject_type: Option<String>,
    /// Expiry, `None` for perpetual access.
    pub expires: Option<DateTime<Utc>>,
}

/// Caller-facing payload for creating a joinable dataset across datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJoinableViewsInput {
    /// Requested joinable dataset name.
    pub name: String,
    /// Expiry of the joinable dataset.
    pub expires: Option<DateTime<Utc>>,
    /// Datasets whose pseudonymized sources are joined.
    pub dataset_ids: Vec<Uuid>,
}
