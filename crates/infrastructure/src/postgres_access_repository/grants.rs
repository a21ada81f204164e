use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use grantkeeper_application::{AccessRepository, GrantAccessInput};
use grantkeeper_core::{AppError, AppResult};
use grantkeeper_domain::Access;

use super::{AccessRow, PostgresAccessRepository};

/// Closes every open grant for the pair and inserts the new one inside
/// `transaction`, keeping at most one open row per dataset and subject.
pub(super) async fn replace_open_access(
    transaction: &mut Transaction<'_, Postgres>,
    input: &GrantAccessInput,
    access_request_id: Option<Uuid>,
) -> AppResult<Access> {
    sqlx::query(
        r#"
        UPDATE dataset_access
        SET revoked = NOW()
        WHERE dataset_id = $1
            AND subject = $2
            AND revoked IS NULL
        "#,
    )
    .bind(input.dataset_id)
    .bind(input.subject.as_str())
    .execute(&mut **transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to close open access: {error}")))?;

    let row = sqlx::query_as::<_, AccessRow>(
        r#"
        INSERT INTO dataset_access (dataset_id, subject, granter, expires, access_request_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, dataset_id, subject, granter, expires, created, revoked, access_request_id
        "#,
    )
    .bind(input.dataset_id)
    .bind(input.subject.as_str())
    .bind(input.granter.as_str())
    .bind(input.expires)
    .bind(access_request_id)
    .fetch_one(&mut **transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to insert access: {error}")))?;

    Ok(row.into())
}

#[async_trait]
impl AccessRepository for PostgresAccessRepository {
    async fn find_access(&self, access_id: Uuid) -> AppResult<Option<Access>> {
        let row = sqlx::query_as::<_, AccessRow>(
            r#"
            SELECT id, dataset_id, subject, granter, expires, created, revoked, access_request_id
            FROM dataset_access
            WHERE id = $1
            "#,
        )
        .bind(access_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find access: {error}")))?;

        Ok(row.map(Access::from))
    }

    async fn list_unrevoked_expired_access(&self, now: DateTime<Utc>) -> AppResult<Vec<Access>> {
        let rows = sqlx::query_as::<_, AccessRow>(
            r#"
            SELECT id, dataset_id, subject, granter, expires, created, revoked, access_request_id
            FROM dataset_access
            WHERE revoked IS NULL
                AND expires < $1
            ORDER BY expires, id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list unrevoked expired access: {error}"))
        })?;

        Ok(rows.into_iter().map(Access::from).collect())
    }

    async fn list_active_access(&self, now: DateTime<Utc>) -> AppResult<Vec<Access>> {
        let rows = sqlx::query_as::<_, AccessRow>(
            r#"
            SELECT id, dataset_id, subject, granter, expires, created, revoked, access_request_id
            FROM dataset_access
            WHERE revoked IS NULL
                AND (expires IS NULL OR expires > $1)
            ORDER BY dataset_id, created
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list active access: {error}")))?;

        Ok(rows.into_iter().map(Access::from).collect())
    }

    async fn list_active_access_for_dataset(
        &self,
        dataset_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<Access>> {
        let rows = sqlx::query_as::<_, AccessRow>(
            r#"
            SELECT id, dataset_id, subject, granter, expires, created, revoked, access_request_id
            FROM dataset_access
            WHERE dataset_id = $1
                AND revoked IS NULL
                AND (expires IS NULL OR expires > $2)
            ORDER BY created
            "#,
        )
        .bind(dataset_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to list active access for dataset '{dataset_id}': {error}"
            ))
        })?;

        Ok(rows.into_iter().map(Access::from).collect())
    }

    async fn grant_access(&self, input: GrantAccessInput) -> AppResult<Access> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        let access = replace_open_access(&mut transaction, &input, None).await?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(access)
    }

    async fn revoke_access(&self, access_id: Uuid) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE dataset_access
            SET revoked = NOW()
            WHERE id = $1
                AND revoked IS NULL
            "#,
        )
        .bind(access_id)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to revoke access: {error}")))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "open access '{access_id}' was not found"
            )));
        }

        Ok(())
    }
}
