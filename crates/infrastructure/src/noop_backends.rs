//! Backends that accept every call without touching external systems.
//!
//! Used when the worker runs without Google Cloud credentials, e.g. locally.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grantkeeper_application::{
    DirectoryBackend, DirectoryGroup, GrantBackend, JoinableViewSource, JoinableViewsCreated,
    WarehouseBackend,
};
use grantkeeper_core::AppResult;
use grantkeeper_domain::{BigQueryCoordinates, Subject, joinable_view_name};
use tracing::debug;

/// Grant backend that logs calls and reports every subject as granted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGrantBackend;

#[async_trait]
impl GrantBackend for NoopGrantBackend {
    async fn grant(
        &self,
        resource: &BigQueryCoordinates,
        subject: &Subject,
        expires: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        debug!(resource = %resource, subject = %subject, expires = ?expires, "noop grant");
        Ok(())
    }

    async fn revoke(&self, resource: &BigQueryCoordinates, subject: &Subject) -> AppResult<()> {
        debug!(resource = %resource, subject = %subject, "noop revoke");
        Ok(())
    }

    async fn check_access(
        &self,
        _resource: &BigQueryCoordinates,
        _subject: &Subject,
    ) -> AppResult<bool> {
        Ok(true)
    }
}

/// Warehouse backend that logs calls and reports views as created in place.
#[derive(Debug, Clone)]
pub struct NoopWarehouseBackend {
    central_project: String,
}

impl NoopWarehouseBackend {
    /// Creates a backend that names views inside `central_project`.
    #[must_use]
    pub fn new(central_project: impl Into<String>) -> Self {
        Self {
            central_project: central_project.into(),
        }
    }
}

#[async_trait]
impl WarehouseBackend for NoopWarehouseBackend {
    async fn delete_joinable_dataset(&self, name: &str) -> AppResult<()> {
        debug!(dataset = name, "noop delete joinable dataset");
        Ok(())
    }

    async fn delete_joinable_view(
        &self,
        name: &str,
        pseudo_source: &BigQueryCoordinates,
    ) -> AppResult<()> {
        debug!(dataset = name, source = %pseudo_source, "noop delete joinable view");
        Ok(())
    }

    async fn delete_pseudo_view(&self, coordinates: &BigQueryCoordinates) -> AppResult<()> {
        debug!(view = %coordinates, "noop delete pseudo view");
        Ok(())
    }

    async fn create_joinable_views_for_user(
        &self,
        name: &str,
        sources: &[JoinableViewSource],
    ) -> AppResult<JoinableViewsCreated> {
        Ok(JoinableViewsCreated {
            dataset: name.to_owned(),
            views: sources
                .iter()
                .map(|source| {
                    BigQueryCoordinates::new(
                        self.central_project.as_str(),
                        name,
                        joinable_view_name(&source.pseudo),
                    )
                })
                .collect(),
        })
    }
}

/// Directory backend in which nobody belongs to any group.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDirectoryBackend;

#[async_trait]
impl DirectoryBackend for NoopDirectoryBackend {
    async fn groups_for_subject(&self, _subject: &Subject) -> AppResult<Vec<DirectoryGroup>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use grantkeeper_application::{JoinableViewSource, WarehouseBackend};
    use grantkeeper_domain::BigQueryCoordinates;

    use super::NoopWarehouseBackend;

    #[tokio::test]
    async fn created_views_are_named_after_their_pseudo_sources() {
        let backend = NoopWarehouseBackend::new("central-data");
        let created = backend
            .create_joinable_views_for_user(
                "alice_join",
                &[JoinableViewSource {
                    reference: BigQueryCoordinates::new("team-prod", "persons", "persons"),
                    pseudo: BigQueryCoordinates::new("team-prod", "markedsplassen", "persons_p"),
                    pseudo_columns: vec!["fnr".to_owned()],
                }],
            )
            .await;
        assert!(created.is_ok_and(|created| {
            created.dataset == "alice_join"
                && created.views
                    == vec![BigQueryCoordinates::new(
                        "central-data",
                        "alice_join",
                        "team-prod_persons_p",
                    )]
        }));
    }
}
