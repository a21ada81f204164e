//! Dataset catalog entries and their physical BigQuery locations.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fully qualified BigQuery table or view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BigQueryCoordinates {
    /// GCP project id.
    pub project_id: String,
    /// BigQuery dataset id.
    pub dataset: String,
    /// Table or view id.
    pub table: String,
}

impl BigQueryCoordinates {
    /// Creates coordinates from their parts.
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl Display for BigQueryCoordinates {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}.{}.{}", self.project_id, self.dataset, self.table)
    }
}

/// Personal-data classification of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiLevel {
    /// Contains directly identifying personal data.
    Sensitive,
    /// Pseudonymized or aggregated personal data.
    Anonymised,
    /// No personal data.
    None,
}

impl PiiLevel {
    /// Returns a stable storage value for this level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sensitive => "sensitive",
            Self::Anonymised => "anonymised",
            Self::None => "none",
        }
    }

    /// Parses a storage value, treating unknown values as sensitive.
    #[must_use]
    pub fn from_storage(value: &str) -> Self {
        match value {
            "anonymised" => Self::Anonymised,
            "none" => Self::None,
            _ => Self::Sensitive,
        }
    }
}

/// Catalog dataset that access is granted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Stable dataset id.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Email of the group owning the dataset's data product.
    pub owner_group: String,
    /// Personal-data classification.
    pub pii: PiiLevel,
}

/// BigQuery source registered for a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BigQueryDatasource {
    /// Stable datasource id.
    pub id: Uuid,
    /// Owning dataset.
    pub dataset_id: Uuid,
    /// Physical location.
    pub coordinates: BigQueryCoordinates,
    /// Columns hashed in the pseudonymized view.
    pub pseudo_columns: Vec<String>,
    /// Whether this is the plain reference table behind a pseudonymized view.
    pub is_reference: bool,
}

impl BigQueryDatasource {
    /// Returns whether the datasource is a pseudonymized view.
    #[must_use]
    pub fn is_pseudonymized(&self) -> bool {
        !self.pseudo_columns.is_empty()
    }
}
