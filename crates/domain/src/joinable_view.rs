//! Owner-scoped pseudonymized views that can be joined across datasets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BigQueryCoordinates;

/// A named joinable dataset created for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinableView {
    /// Stable joinable view id.
    pub id: Uuid,
    /// Name, also used as the BigQuery dataset id in the central project.
    pub name: String,
    /// Email of the user owning the view.
    pub owner: String,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Expiry, `None` when the view lives until its sources go away.
    pub expires: Option<DateTime<Utc>>,
    /// Soft-delete timestamp.
    pub deleted: Option<DateTime<Utc>>,
}

impl JoinableView {
    /// Returns whether the view has passed its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires < now)
    }
}

/// Link between a joinable view and a pseudonymized datasource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinableViewDatasource {
    /// Joinable view id.
    pub joinable_view_id: Uuid,
    /// Pseudonymized datasource id.
    pub datasource_id: Uuid,
}

/// A live joinable view joined with the pseudonymized source it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinableViewWithReference {
    /// Joinable view.
    pub view: JoinableView,
    /// Dataset behind the pseudonymized source.
    pub dataset_id: Uuid,
    /// Location of the pseudonymized source.
    pub pseudo_source: BigQueryCoordinates,
}

impl JoinableViewWithReference {
    /// Returns the joinable-view table the owner reads, inside `central_project`.
    #[must_use]
    pub fn resource(&self, central_project: &str) -> BigQueryCoordinates {
        BigQueryCoordinates::new(
            central_project,
            self.view.name.as_str(),
            joinable_view_name(&self.pseudo_source),
        )
    }
}

/// Name of the view created for `source` inside a joinable dataset.
///
/// All pseudonymized sources live in the same marketplace dataset, so the
/// project and table ids are enough to keep names unique.
#[must_use]
pub fn joinable_view_name(source: &BigQueryCoordinates) -> String {
    format!("{}_{}", source.project_id, source.table)
}
