use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use grantkeeper_application::{CreateJoinableViewInput, JoinableViewRepository};
use grantkeeper_core::{AppError, AppResult};
use grantkeeper_domain::{BigQueryCoordinates, JoinableView, JoinableViewWithReference};

/// PostgreSQL-backed repository for joinable views and their sources.
#[derive(Clone)]
pub struct PostgresJoinableViewRepository {
    pool: PgPool,
}

impl PostgresJoinableViewRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct JoinableViewRow {
    id: Uuid,
    name: String,
    owner: String,
    created: DateTime<Utc>,
    expires: Option<DateTime<Utc>>,
    deleted: Option<DateTime<Utc>>,
}

impl From<JoinableViewRow> for JoinableView {
    fn from(row: JoinableViewRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            owner: row.owner,
            created: row.created,
            expires: row.expires,
            deleted: row.deleted,
        }
    }
}

#[derive(Debug, FromRow)]
struct JoinableViewReferenceRow {
    id: Uuid,
    name: String,
    owner: String,
    created: DateTime<Utc>,
    expires: Option<DateTime<Utc>>,
    dataset_id: Uuid,
    project_id: String,
    dataset: String,
    table_name: String,
}

impl From<JoinableViewReferenceRow> for JoinableViewWithReference {
    fn from(row: JoinableViewReferenceRow) -> Self {
        Self {
            view: JoinableView {
                id: row.id,
                name: row.name,
                owner: row.owner,
                created: row.created,
                expires: row.expires,
                deleted: None,
            },
            dataset_id: row.dataset_id,
            pseudo_source: BigQueryCoordinates::new(row.project_id, row.dataset, row.table_name),
        }
    }
}

#[async_trait]
impl JoinableViewRepository for PostgresJoinableViewRepository {
    async fn create_joinable_view(
        &self,
        input: CreateJoinableViewInput,
    ) -> AppResult<JoinableView> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        let row = sqlx::query_as::<_, JoinableViewRow>(
            r#"
            INSERT INTO joinable_views (name, owner, expires)
            VALUES ($1, $2, $3)
            RETURNING id, name, owner, created, expires, deleted
            "#,
        )
        .bind(input.name.as_str())
        .bind(input.owner.as_str())
        .bind(input.expires)
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to create joinable view: {error}")))?;

        for datasource_id in &input.datasource_ids {
            sqlx::query(
                r#"
                INSERT INTO joinable_views_datasource (joinable_view_id, datasource_id)
                VALUES ($1, $2)
                ON CONFLICT (joinable_view_id, datasource_id) DO NOTHING
                "#,
            )
            .bind(row.id)
            .bind(datasource_id)
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to link datasource '{datasource_id}' to joinable view: {error}"
                ))
            })?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(row.into())
    }

    async fn list_joinable_views_for_owner(&self, owner: &str) -> AppResult<Vec<JoinableView>> {
        let rows = sqlx::query_as::<_, JoinableViewRow>(
            r#"
            SELECT id, name, owner, created, expires, deleted
            FROM joinable_views
            WHERE owner = $1
                AND deleted IS NULL
            ORDER BY created DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list joinable views: {error}")))?;

        Ok(rows.into_iter().map(JoinableView::from).collect())
    }

    async fn list_expired_joinable_views(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<JoinableView>> {
        let rows = sqlx::query_as::<_, JoinableViewRow>(
            r#"
            SELECT id, name, owner, created, expires, deleted
            FROM joinable_views
            WHERE deleted IS NULL
                AND expires < $1
            ORDER BY expires
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list expired joinable views: {error}"))
        })?;

        Ok(rows.into_iter().map(JoinableView::from).collect())
    }

    async fn list_joinable_views_with_reference(
        &self,
    ) -> AppResult<Vec<JoinableViewWithReference>> {
        let rows = sqlx::query_as::<_, JoinableViewReferenceRow>(
            r#"
            SELECT views.id, views.name, views.owner, views.created, views.expires,
                sources.dataset_id, sources.project_id, sources.dataset, sources.table_name
            FROM joinable_views AS views
            INNER JOIN joinable_views_datasource AS links
                ON links.joinable_view_id = views.id
            INNER JOIN datasources_bigquery AS sources
                ON sources.id = links.datasource_id
            WHERE views.deleted IS NULL
                AND sources.deleted IS NULL
            ORDER BY views.id, sources.dataset_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list joinable views with reference: {error}"))
        })?;

        Ok(rows.into_iter().map(JoinableViewWithReference::from).collect())
    }

    async fn list_joinable_views_for_reference_and_owner(
        &self,
        owner: &str,
        dataset_id: Uuid,
    ) -> AppResult<Vec<JoinableView>> {
        let rows = sqlx::query_as::<_, JoinableViewRow>(
            r#"
            SELECT DISTINCT views.id, views.name, views.owner, views.created, views.expires,
                views.deleted
            FROM joinable_views AS views
            INNER JOIN joinable_views_datasource AS links
                ON links.joinable_view_id = views.id
            INNER JOIN datasources_bigquery AS sources
                ON sources.id = links.datasource_id
            WHERE views.owner = $1
                AND sources.dataset_id = $2
                AND views.deleted IS NULL
                AND sources.deleted IS NULL
            "#,
        )
        .bind(owner)
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list joinable views of '{owner}' for dataset '{dataset_id}': {error}"
            ))
        })?;

        Ok(rows.into_iter().map(JoinableView::from).collect())
    }

    async fn list_joinable_views_for_datasource(
        &self,
        datasource_id: Uuid,
    ) -> AppResult<Vec<JoinableView>> {
        let rows = sqlx::query_as::<_, JoinableViewRow>(
            r#"
            SELECT views.id, views.name, views.owner, views.created, views.expires, views.deleted
            FROM joinable_views AS views
            INNER JOIN joinable_views_datasource AS links
                ON links.joinable_view_id = views.id
            WHERE links.datasource_id = $1
                AND views.deleted IS NULL
            "#,
        )
        .bind(datasource_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list joinable views for datasource '{datasource_id}': {error}"
            ))
        })?;

        Ok(rows.into_iter().map(JoinableView::from).collect())
    }

    async fn set_joinable_view_deleted(&self, joinable_view_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE joinable_views
            SET deleted = NOW()
            WHERE id = $1
                AND deleted IS NULL
            "#,
        )
        .bind(joinable_view_id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to mark joinable view deleted: {error}"))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use grantkeeper_application::{CreateJoinableViewInput, JoinableViewRepository};

    use super::PostgresJoinableViewRepository;
    use crate::test_database::{insert_dataset, insert_datasource, test_pool};

    #[tokio::test]
    async fn joinable_view_lifecycle_follows_expiry_and_soft_delete() {
        let Some(pool) = test_pool().await else {
            return;
        };

        let repository = PostgresJoinableViewRepository::new(pool.clone());
        let dataset_id = insert_dataset(&pool, "owners@example.com").await;
        let pseudo_id = insert_datasource(&pool, dataset_id, "persons_pseudo", &["fnr"], false).await;
        let owner = format!("{}@example.com", uuid::Uuid::new_v4().simple());

        let view = repository
            .create_joinable_view(CreateJoinableViewInput {
                name: "alice_join".to_owned(),
                owner: owner.clone(),
                expires: Some(Utc::now() - Duration::minutes(1)),
                datasource_ids: vec![pseudo_id],
            })
            .await;
        assert!(view.is_ok());
        let view = view.unwrap_or_else(|_| unreachable!());

        let with_reference = repository
            .list_joinable_views_with_reference()
            .await
            .unwrap_or_default();
        let row = with_reference.iter().find(|row| row.view.id == view.id);
        assert!(row.is_some_and(|row| {
            row.dataset_id == dataset_id && row.pseudo_source.table == "persons_pseudo"
        }));

        let for_owner = repository
            .list_joinable_views_for_reference_and_owner(owner.as_str(), dataset_id)
            .await
            .unwrap_or_default();
        assert_eq!(for_owner.len(), 1);
        let for_source = repository
            .list_joinable_views_for_datasource(pseudo_id)
            .await
            .unwrap_or_default();
        assert_eq!(for_source.len(), 1);

        let expired = repository
            .list_expired_joinable_views(Utc::now())
            .await
            .unwrap_or_default();
        assert!(expired.iter().any(|expired| expired.id == view.id));

        assert!(repository.set_joinable_view_deleted(view.id).await.is_ok());
        let remaining = repository
            .list_joinable_views_for_owner(owner.as_str())
            .await
            .unwrap_or_default();
        assert!(remaining.is_empty());
    }
}
