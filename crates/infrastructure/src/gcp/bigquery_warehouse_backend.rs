use async_trait::async_trait;
use grantkeeper_application::{JoinableViewSource, JoinableViewsCreated, WarehouseBackend};
use grantkeeper_core::{AppError, AppResult};
use grantkeeper_domain::{BigQueryCoordinates, joinable_view_name};
use reqwest::Method;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use super::GcpRestClient;
use super::rest_client::api_url;

const SECRETS_DATASET: &str = "secrets_vault";
const SECRETS_TABLE: &str = "secrets";
const MAX_DATASET_POSTFIX: u32 = 100;

/// Maps a requested joinable dataset name onto a valid BigQuery dataset id.
fn sanitize_dataset_id(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || character == '_' {
                character
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "joinable".to_owned()
    } else {
        sanitized
    }
}

/// Builds the view over a plain reference table that hashes its pseudonymized
/// columns with the joinable dataset's salt.
fn compose_joinable_view_query(
    central_project: &str,
    joinable_dataset: &str,
    source: &JoinableViewSource,
) -> String {
    let salt = format!(
        "WITH unified_salt AS (SELECT value AS salt FROM `{central_project}.{SECRETS_DATASET}.{SECRETS_TABLE}` WHERE key = '{joinable_dataset}')"
    );
    let hashed: Vec<String> = source
        .pseudo_columns
        .iter()
        .map(|column| format!("SHA256({column} || unified_salt.salt) AS _x_{column}"))
        .collect();
    let reference = &source.reference;
    let from = format!(
        "FROM `{}.{}.{}` AS I, unified_salt",
        reference.project_id, reference.dataset, reference.table
    );

    if hashed.is_empty() {
        return format!("{salt} SELECT I.* {from}");
    }

    format!(
        "{salt} SELECT {}, I.* EXCEPT({}) {from}",
        hashed.join(", "),
        source.pseudo_columns.join(", ")
    )
}

fn ignore_not_found(result: AppResult<serde_json::Value>) -> AppResult<()> {
    match result {
        Ok(_) | Err(AppError::NotFound(_)) => Ok(()),
        Err(error) => Err(error),
    }
}

fn ignore_conflict(result: AppResult<serde_json::Value>) -> AppResult<()> {
    match result {
        Ok(_) | Err(AppError::Conflict(_)) => Ok(()),
        Err(error) => Err(error),
    }
}

/// BigQuery REST implementation of pseudonymized and joinable view management.
#[derive(Debug, Clone)]
pub struct BigQueryWarehouseBackend {
    client: GcpRestClient,
    endpoint: String,
    central_project: String,
    location: String,
}

impl BigQueryWarehouseBackend {
    /// Creates a backend that owns joinable datasets in `central_project`.
    #[must_use]
    pub fn new(
        client: GcpRestClient,
        endpoint: impl Into<String>,
        central_project: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            central_project: central_project.into(),
            location: location.into(),
        }
    }

    fn url(&self, path: &str) -> AppResult<Url> {
        api_url(self.endpoint.as_str(), path)
    }

    fn table_url(&self, coordinates: &BigQueryCoordinates) -> AppResult<Url> {
        self.url(
            format!(
                "projects/{}/datasets/{}/tables/{}",
                coordinates.project_id, coordinates.dataset, coordinates.table
            )
            .as_str(),
        )
    }

    async fn create_dataset(&self, dataset_id: &str) -> AppResult<serde_json::Value> {
        let url = self.url(format!("projects/{}/datasets", self.central_project).as_str())?;
        let body = json!({
            "datasetReference": {
                "projectId": self.central_project,
                "datasetId": dataset_id,
            },
            "location": self.location,
        });
        self.client.send(Method::POST, url, Some(&body)).await
    }

    /// Creates the joinable dataset, appending a numeric postfix while the id is taken.
    async fn create_unique_dataset(&self, name: &str) -> AppResult<String> {
        let base = sanitize_dataset_id(name);
        for attempt in 0..MAX_DATASET_POSTFIX {
            let candidate = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}{attempt}")
            };

            match self.create_dataset(candidate.as_str()).await {
                Ok(_) => return Ok(candidate),
                Err(AppError::Conflict(_)) => continue,
                Err(error) => return Err(error),
            }
        }

        Err(AppError::Conflict(format!(
            "no free joinable dataset id for '{base}'"
        )))
    }

    async fn ensure_secrets_table(&self) -> AppResult<()> {
        ignore_conflict(self.create_dataset(SECRETS_DATASET).await)?;

        let url = self.url(
            format!(
                "projects/{}/datasets/{SECRETS_DATASET}/tables",
                self.central_project
            )
            .as_str(),
        )?;
        let body = json!({
            "tableReference": {
                "projectId": self.central_project,
                "datasetId": SECRETS_DATASET,
                "tableId": SECRETS_TABLE,
            },
            "schema": {
                "fields": [
                    {"name": "key", "type": "STRING"},
                    {"name": "value", "type": "STRING"},
                ]
            },
        });
        ignore_conflict(self.client.send(Method::POST, url, Some(&body)).await)
    }

    async fn insert_salt_if_missing(&self, joinable_dataset: &str) -> AppResult<()> {
        let secrets = format!("{}.{SECRETS_DATASET}.{SECRETS_TABLE}", self.central_project);
        let query = format!(
            "INSERT INTO `{secrets}` (key, value) SELECT '{joinable_dataset}', GENERATE_UUID() FROM UNNEST([1]) \
             WHERE NOT EXISTS (SELECT 1 FROM `{secrets}` WHERE key = '{joinable_dataset}')"
        );
        let url = self.url(format!("projects/{}/queries", self.central_project).as_str())?;
        let body = json!({
            "query": query,
            "useLegacySql": false,
            "location": self.location,
        });
        self.client.send(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    async fn create_view(
        &self,
        joinable_dataset: &str,
        source: &JoinableViewSource,
    ) -> AppResult<BigQueryCoordinates> {
        let view = BigQueryCoordinates::new(
            self.central_project.as_str(),
            joinable_dataset,
            joinable_view_name(&source.pseudo),
        );
        let url = self.url(
            format!(
                "projects/{}/datasets/{joinable_dataset}/tables",
                self.central_project
            )
            .as_str(),
        )?;
        let body = json!({
            "tableReference": {
                "projectId": view.project_id,
                "datasetId": view.dataset,
                "tableId": view.table,
            },
            "view": {
                "query": compose_joinable_view_query(
                    self.central_project.as_str(),
                    joinable_dataset,
                    source,
                ),
                "useLegacySql": false,
            },
        });
        self.client
            .send(Method::POST, url, Some(&body))
            .await
            .map_err(|error| {
                AppError::Upstream(format!(
                    "failed to create joinable view '{view}'; sources must share the '{}' location: {error}",
                    self.location
                ))
            })?;
        Ok(view)
    }
}

#[async_trait]
impl WarehouseBackend for BigQueryWarehouseBackend {
    async fn delete_joinable_dataset(&self, name: &str) -> AppResult<()> {
        let mut url = self.url(format!("projects/{}/datasets/{name}", self.central_project).as_str())?;
        url.query_pairs_mut().append_pair("deleteContents", "true");
        ignore_not_found(self.client.send(Method::DELETE, url, None).await)?;
        info!(dataset = name, "deleted joinable dataset");
        Ok(())
    }

    async fn delete_joinable_view(
        &self,
        name: &str,
        pseudo_source: &BigQueryCoordinates,
    ) -> AppResult<()> {
        let view = BigQueryCoordinates::new(
            self.central_project.as_str(),
            name,
            joinable_view_name(pseudo_source),
        );
        ignore_not_found(
            self.client
                .send(Method::DELETE, self.table_url(&view)?, None)
                .await,
        )
    }

    async fn delete_pseudo_view(&self, coordinates: &BigQueryCoordinates) -> AppResult<()> {
        ignore_not_found(
            self.client
                .send(Method::DELETE, self.table_url(coordinates)?, None)
                .await,
        )
    }

    async fn create_joinable_views_for_user(
        &self,
        name: &str,
        sources: &[JoinableViewSource],
    ) -> AppResult<JoinableViewsCreated> {
        let dataset = self.create_unique_dataset(name).await?;
        self.ensure_secrets_table().await?;
        self.insert_salt_if_missing(dataset.as_str()).await?;

        let mut views = Vec::with_capacity(sources.len());
        for source in sources {
            match self.create_view(dataset.as_str(), source).await {
                Ok(view) => views.push(view),
                Err(error) => {
                    warn!(dataset = %dataset, error = %error, "joinable view creation failed, dropping dataset");
                    if let Err(cleanup_error) = self.delete_joinable_dataset(dataset.as_str()).await {
                        warn!(dataset = %dataset, error = %cleanup_error, "failed to drop partial joinable dataset");
                    }
                    return Err(error);
                }
            }
        }

        Ok(JoinableViewsCreated { dataset, views })
    }
}

#[cfg(test)]
mod tests {
    use grantkeeper_application::JoinableViewSource;
    use grantkeeper_domain::BigQueryCoordinates;

    use super::{compose_joinable_view_query, sanitize_dataset_id};

    fn source(columns: &[&str]) -> JoinableViewSource {
        JoinableViewSource {
            reference: BigQueryCoordinates::new("team-prod", "persons", "persons"),
            pseudo: BigQueryCoordinates::new("team-prod", "markedsplassen", "persons_pseudo"),
            pseudo_columns: columns.iter().map(|column| (*column).to_owned()).collect(),
        }
    }

    #[test]
    fn dataset_ids_keep_only_bigquery_characters() {
        assert_eq!(sanitize_dataset_id("alice's join-2"), "alice_s_join_2");
        assert_eq!(sanitize_dataset_id("  "), "joinable");
    }

    #[test]
    fn view_query_hashes_pseudo_columns_with_the_shared_salt() {
        let query = compose_joinable_view_query("central-data", "alice_join", &source(&["fnr", "dnr"]));
        assert!(query.starts_with(
            "WITH unified_salt AS (SELECT value AS salt FROM `central-data.secrets_vault.secrets` WHERE key = 'alice_join')"
        ));
        assert!(query.contains(
            "SELECT SHA256(fnr || unified_salt.salt) AS _x_fnr, SHA256(dnr || unified_salt.salt) AS _x_dnr, I.* EXCEPT(fnr, dnr)"
        ));
        assert!(query.ends_with("FROM `team-prod.persons.persons` AS I, unified_salt"));
    }

    #[test]
    fn view_query_without_pseudo_columns_selects_everything() {
        let query = compose_joinable_view_query("central-data", "alice_join", &source(&[]));
        assert!(query.contains("SELECT I.* FROM"));
        assert!(!query.contains("EXCEPT"));
    }
}
