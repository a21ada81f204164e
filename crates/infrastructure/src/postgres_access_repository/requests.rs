use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use grantkeeper_application::{
    AccessRequestRepository, GrantAccessInput, NewAccessRequest, UpdateAccessRequestInput,
};
use grantkeeper_core::{AppError, AppResult};
use grantkeeper_domain::{Access, AccessRequest};

use super::grants::replace_open_access;
use super::{AccessRequestRow, PostgresAccessRepository, decode_requests};

/// Explains why a pending-only statement touched no row.
async fn not_pending_error(pool: &PgPool, request_id: Uuid) -> AppError {
    let status = sqlx::query_scalar::<_, String>(
        r#"
        SELECT status
        FROM dataset_access_requests
        WHERE id = $1
        "#,
    )
    .bind(request_id)
    .fetch_optional(pool)
    .await;

    match status {
        Ok(Some(status)) => {
            AppError::Conflict(format!("access request '{request_id}' is already {status}"))
        }
        Ok(None) => AppError::NotFound(format!("access request '{request_id}' was not found")),
        Err(error) => AppError::Internal(format!("failed to load access request: {error}")),
    }
}

#[async_trait]
impl AccessRequestRepository for PostgresAccessRepository {
    async fn create_access_request(&self, request: NewAccessRequest) -> AppResult<AccessRequest> {
        let row = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            INSERT INTO dataset_access_requests (dataset_id, subject, owner, expires, documentation_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, dataset_id, subject, owner, created, status, closed, expires,
                granter, reason, documentation_id
            "#,
        )
        .bind(request.dataset_id)
        .bind(request.subject)
        .bind(request.owner)
        .bind(request.expires)
        .bind(request.documentation_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to create access request: {error}"))
        })?;

        AccessRequest::try_from(row)
    }

    async fn find_access_request(&self, request_id: Uuid) -> AppResult<Option<AccessRequest>> {
        let row = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            SELECT id, dataset_id, subject, owner, created, status, closed, expires,
                granter, reason, documentation_id
            FROM dataset_access_requests
            WHERE id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find access request: {error}")))?;

        row.map(AccessRequest::try_from).transpose()
    }

    async fn list_access_requests_for_dataset(
        &self,
        dataset_id: Uuid,
    ) -> AppResult<Vec<AccessRequest>> {
        let rows = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            SELECT id, dataset_id, subject, owner, created, status, closed, expires,
                granter, reason, documentation_id
            FROM dataset_access_requests
            WHERE dataset_id = $1
            ORDER BY created DESC
            "#,
        )
        .bind(dataset_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list access requests: {error}"))
        })?;

        decode_requests(rows)
    }

    async fn list_pending_access_requests_for_owners(
        &self,
        owners: &[String],
    ) -> AppResult<Vec<AccessRequest>> {
        let rows = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            SELECT id, dataset_id, subject, owner, created, status, closed, expires,
                granter, reason, documentation_id
            FROM dataset_access_requests
            WHERE status = 'pending'
                AND owner = ANY($1)
            ORDER BY created DESC
            "#,
        )
        .bind(owners)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list pending access requests: {error}"))
        })?;

        decode_requests(rows)
    }

    async fn update_access_request(
        &self,
        input: UpdateAccessRequestInput,
    ) -> AppResult<AccessRequest> {
        let row = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            UPDATE dataset_access_requests
            SET owner = $2,
                expires = $3,
                documentation_id = $4
            WHERE id = $1
                AND status = 'pending'
            RETURNING id, dataset_id, subject, owner, created, status, closed, expires,
                granter, reason, documentation_id
            "#,
        )
        .bind(input.id)
        .bind(input.owner)
        .bind(input.expires)
        .bind(input.documentation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to update access request: {error}"))
        })?;

        match row {
            Some(row) => AccessRequest::try_from(row),
            None => Err(not_pending_error(&self.pool, input.id).await),
        }
    }

    async fn delete_access_request(&self, request_id: Uuid) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM dataset_access_requests
            WHERE id = $1
                AND status = 'pending'
            "#,
        )
        .bind(request_id)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to delete access request: {error}"))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(not_pending_error(&self.pool, request_id).await);
        }

        Ok(())
    }

    async fn approve_access_request(&self, request_id: Uuid, granter: &str) -> AppResult<Access> {
        let mut transaction =
            self.pool.begin().await.map_err(|error| {
                AppError::Internal(format!("failed to begin transaction: {error}"))
            })?;

        let request = sqlx::query_as::<_, AccessRequestRow>(
            r#"
            SELECT id, dataset_id, subject, owner, created, status, closed, expires,
                granter, reason, documentation_id
            FROM dataset_access_requests
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(request_id)
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load access request: {error}")))?
        .ok_or_else(|| {
            AppError::NotFound(format!("access request '{request_id}' was not found"))
        })?;

        let access = replace_open_access(
            &mut transaction,
            &GrantAccessInput {
                dataset_id: request.dataset_id,
                subject: request.subject,
                expires: request.expires,
                granter: granter.to_owned(),
            },
            Some(request_id),
        )
        .await?;

        let rows_affected = sqlx::query(
            r#"
            UPDATE dataset_access_requests
            SET status = 'approved',
                granter = $2,
                closed = NOW()
            WHERE id = $1
                AND status = 'pending'
            "#,
        )
        .bind(request_id)
        .bind(granter)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to approve access request: {error}"))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::Conflict(format!(
                "access request '{request_id}' is already {}",
                request.status
            )));
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit transaction: {error}"))
        })?;

        Ok(access)
    }

    async fn deny_access_request(
        &self,
        request_id: Uuid,
        granter: &str,
        reason: Option<&str>,
    ) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE dataset_access_requests
            SET status = 'denied',
                granter = $2,
                reason = $3,
                closed = NOW()
            WHERE id = $1
                AND status = 'pending'
            "#,
        )
        .bind(request_id)
        .bind(granter)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to deny access request: {error}")))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(not_pending_error(&self.pool, request_id).await);
        }

        Ok(())
    }
}
