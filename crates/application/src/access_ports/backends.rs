use async_trait::async_trait;
use chrono::{DateTime, Utc};

use grantkeeper_core::AppResult;
use grantkeeper_domain::{BigQueryCoordinates, Subject};

/// IAM port for read grants on one physical table or view.
///
/// Every operation is idempotent: granting an existing member and revoking a
/// missing one both succeed.
#[async_trait]
pub trait GrantBackend: Send + Sync {
    /// Grants `subject` read access on `resource`.
    async fn grant(
        &self,
        resource: &BigQueryCoordinates,
        subject: &Subject,
        expires: Option<DateTime<Utc>>,
    ) -> AppResult<()>;

    /// Removes `subject`'s read access on `resource`.
    async fn revoke(&self, resource: &BigQueryCoordinates, subject: &Subject) -> AppResult<()>;

    /// Returns whether `subject` currently holds read access on `resource`.
    async fn check_access(
        &self,
        resource: &BigQueryCoordinates,
        subject: &Subject,
    ) -> AppResult<bool>;
}

/// One dataset contributing a view to a joinable dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinableViewSource {
    /// Plain reference table the view reads.
    pub reference: BigQueryCoordinates,
    /// Pseudonymized view of the same dataset, which names the joinable view.
    pub pseudo: BigQueryCoordinates,
    /// Columns hashed with the joinable dataset's shared salt.
    pub pseudo_columns: Vec<String>,
}

/// Warehouse objects created for one joinable dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinableViewsCreated {
    /// Dataset id actually created; may carry a numeric suffix on name clashes.
    pub dataset: String,
    /// Views created inside the dataset.
    pub views: Vec<BigQueryCoordinates>,
}

/// Warehouse port for pseudonymized and joinable views.
///
/// Deleting an object that is already gone succeeds.
#[async_trait]
pub trait WarehouseBackend: Send + Sync {
    /// Drops a joinable dataset and all views in it.
    async fn delete_joinable_dataset(&self, name: &str) -> AppResult<()>;

    /// Drops the view named after `pseudo_source` inside joinable dataset `name`.
    async fn delete_joinable_view(
        &self,
        name: &str,
        pseudo_source: &BigQueryCoordinates,
    ) -> AppResult<()>;

    /// Drops a pseudonymized view.
    async fn delete_pseudo_view(&self, coordinates: &BigQueryCoordinates) -> AppResult<()>;

    /// Creates a joinable dataset named after `name` with one view per source.
    async fn create_joinable_views_for_user(
        &self,
        name: &str,
        sources: &[JoinableViewSource],
    ) -> AppResult<JoinableViewsCreated>;
}

/// Group a subject belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryGroup {
    /// Group email, compared against dataset owner groups.
    pub email: String,
    /// Display name.
    pub name: String,
}

/// Directory port resolving group memberships.
#[async_trait]
pub trait DirectoryBackend: Send + Sync {
    /// Lists the groups `subject` is a member of.
    async fn groups_for_subject(&self, subject: &Subject) -> AppResult<Vec<DirectoryGroup>>;
}
