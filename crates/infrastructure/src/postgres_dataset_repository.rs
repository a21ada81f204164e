use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use grantkeeper_application::DatasetRepository;
use grantkeeper_core::{AppError, AppResult};
use grantkeeper_domain::{BigQueryCoordinates, BigQueryDatasource, Dataset, PiiLevel};

/// PostgreSQL-backed read repository for the dataset catalog.
#[derive(Clone)]
pub struct PostgresDatasetRepository {
    pool: PgPool,
}

impl PostgresDatasetRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct DatasetRow {
    id: Uuid,
    name: String,
    owner_group: String,
    pii: String,
}

#[derive(Debug, FromRow)]
struct DatasourceRow {
    id: Uuid,
    dataset_id: Uuid,
    project_id: String,
    dataset: String,
    table_name: String,
    pseudo_columns: Vec<String>,
    is_reference: bool,
}

impl From<DatasourceRow> for BigQueryDatasource {
    fn from(row: DatasourceRow) -> Self {
        Self {
            id: row.id,
            dataset_id: row.dataset_id,
            coordinates: BigQueryCoordinates::new(row.project_id, row.dataset, row.table_name),
            pseudo_columns: row.pseudo_columns,
            is_reference: row.is_reference,
        }
    }
}

#[async_trait]
impl DatasetRepository for PostgresDatasetRepository {
    async fn find_dataset(&self, dataset_id: Uuid) -> AppResult<Option<Dataset>> {
        let row = sqlx::query_as::<_, DatasetRow>(
            r#"
            SELECT id, name, owner_group, pii
            FROM datasets
            WHERE id = $1
            "#,
        )
        .bind(dataset_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find dataset: {error}")))?;

        Ok(row.map(|row| Dataset {
            id: row.id,
            name: row.name,
            owner_group: row.owner_group,
            pii: PiiLevel::from_storage(row.pii.as_str()),
        }))
    }

    async fn find_bigquery_datasource(
        &self,
        dataset_id: Uuid,
        is_reference: bool,
    ) -> AppResult<Option<BigQueryDatasource>> {
        let row = sqlx::query_as::<_, DatasourceRow>(
            r#"
            SELECT id, dataset_id, project_id, dataset, table_name, pseudo_columns, is_reference
            FROM datasources_bigquery
            WHERE dataset_id = $1
                AND is_reference = $2
                AND deleted IS NULL
            ORDER BY created DESC
            LIMIT 1
            "#,
        )
        .bind(dataset_id)
        .bind(is_reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to find bigquery datasource for dataset '{dataset_id}': {error}"
            ))
        })?;

        Ok(row.map(BigQueryDatasource::from))
    }

    async fn list_orphaned_pseudo_datasources(&self) -> AppResult<Vec<BigQueryDatasource>> {
        let rows = sqlx::query_as::<_, DatasourceRow>(
            r#"
            SELECT sources.id, sources.dataset_id, sources.project_id, sources.dataset,
                sources.table_name, sources.pseudo_columns, sources.is_reference
            FROM datasources_bigquery AS sources
            LEFT JOIN datasets
                ON datasets.id = sources.dataset_id
            WHERE datasets.id IS NULL
                AND sources.is_reference = false
                AND sources.deleted IS NULL
            ORDER BY sources.created
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list orphaned pseudo datasources: {error}"))
        })?;

        Ok(rows.into_iter().map(BigQueryDatasource::from).collect())
    }

    async fn set_datasource_deleted(&self, datasource_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE datasources_bigquery
            SET deleted = NOW()
            WHERE id = $1
                AND deleted IS NULL
            "#,
        )
        .bind(datasource_id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to mark datasource deleted: {error}"))
        })?;

        Ok(())
    }
}
