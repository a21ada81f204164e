use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use grantkeeper_core::{AppError, AppResult};
use grantkeeper_domain::{Access, AccessRequest, AccessRequestStatus};

mod grants;
mod requests;

/// PostgreSQL-backed repository for dataset access grants and requests.
#[derive(Clone)]
pub struct PostgresAccessRepository {
    pool: PgPool,
}

impl PostgresAccessRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AccessRow {
    id: Uuid,
    dataset_id: Uuid,
    subject: String,
    granter: String,
    expires: Option<DateTime<Utc>>,
    created: DateTime<Utc>,
    revoked: Option<DateTime<Utc>>,
    access_request_id: Option<Uuid>,
}

impl From<AccessRow> for Access {
    fn from(row: AccessRow) -> Self {
        Self {
            id: row.id,
            dataset_id: row.dataset_id,
            subject: row.subject,
            granter: row.granter,
            expires: row.expires,
            created: row.created,
            revoked: row.revoked,
            access_request_id: row.access_request_id,
        }
    }
}

#[derive(Debug, FromRow)]
struct AccessRequestRow {
    id: Uuid,
    dataset_id: Uuid,
    subject: String,
    owner: String,
    created: DateTime<Utc>,
    status: String,
    closed: Option<DateTime<Utc>>,
    expires: Option<DateTime<Utc>>,
    granter: Option<String>,
    reason: Option<String>,
    documentation_id: Option<Uuid>,
}

impl TryFrom<AccessRequestRow> for AccessRequest {
    type Error = AppError;

    fn try_from(row: AccessRequestRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<AccessRequestStatus>().map_err(|error| {
            AppError::Internal(format!(
                "failed to decode status of access request '{}': {error}",
                row.id
            ))
        })?;

        Ok(Self {
            id: row.id,
            dataset_id: row.dataset_id,
            subject: row.subject,
            owner: row.owner,
            created: row.created,
            status,
            closed: row.closed,
            expires: row.expires,
            granter: row.granter,
            reason: row.reason,
            documentation_id: row.documentation_id,
        })
    }
}

fn decode_requests(rows: Vec<AccessRequestRow>) -> AppResult<Vec<AccessRequest>> {
    rows.into_iter().map(AccessRequest::try_from).collect()
}
