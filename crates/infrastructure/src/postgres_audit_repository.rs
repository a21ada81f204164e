use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use grantkeeper_application::{AccessAuditEvent, AuditRepository};
use grantkeeper_core::{AppError, AppResult};
use grantkeeper_domain::AccessAuditAction;

/// PostgreSQL-backed append-only access history.
#[derive(Clone)]
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditEventRow {
    dataset_id: Option<Uuid>,
    actor: String,
    subject: Option<String>,
    action: String,
    resource_id: String,
    detail: Option<String>,
    created: DateTime<Utc>,
}

fn decode_action(value: &str) -> AppResult<AccessAuditAction> {
    [
        AccessAuditAction::AccessGranted,
        AccessAuditAction::AccessRevoked,
        AccessAuditAction::AccessDriftRepaired,
        AccessAuditAction::AccessRequestCreated,
        AccessAuditAction::AccessRequestUpdated,
        AccessAuditAction::AccessRequestDeleted,
        AccessAuditAction::AccessRequestApproved,
        AccessAuditAction::AccessRequestDenied,
        AccessAuditAction::JoinableViewDeleted,
        AccessAuditAction::PseudoViewDeleted,
    ]
    .into_iter()
    .find(|action| action.as_str() == value)
    .ok_or_else(|| AppError::Internal(format!("unknown access audit action '{value}'")))
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append_event(&self, event: AccessAuditEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO access_audit_events (
                dataset_id,
                actor,
                subject,
                action,
                resource_id,
                detail,
                created
            )
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, NOW()))
            "#,
        )
        .bind(event.dataset_id)
        .bind(event.actor)
        .bind(event.subject)
        .bind(event.action.as_str())
        .bind(event.resource_id)
        .bind(event.detail)
        .bind(event.created)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to append audit event: {error}")))?;

        Ok(())
    }

    async fn list_events_for_dataset(
        &self,
        dataset_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<AccessAuditEvent>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, AuditEventRow>(
            r#"
            SELECT dataset_id, actor, subject, action, resource_id, detail, created
            FROM access_audit_events
            WHERE dataset_id = $1
            ORDER BY created DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(dataset_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list audit events: {error}")))?;

        rows.into_iter()
            .map(|row| {
                Ok(AccessAuditEvent {
                    dataset_id: row.dataset_id,
                    actor: row.actor,
                    subject: row.subject,
                    action: decode_action(row.action.as_str())?,
                    resource_id: row.resource_id,
                    detail: row.detail,
                    created: Some(row.created),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use grantkeeper_application::{AccessAuditEvent, AuditRepository};
    use grantkeeper_domain::{AccessAuditAction, RECONCILER_ACTOR};
    use uuid::Uuid;

    use super::{PostgresAuditRepository, decode_action};
    use crate::test_database::test_pool;

    #[test]
    fn every_action_decodes_from_its_storage_value() {
        for action in [
            AccessAuditAction::AccessGranted,
            AccessAuditAction::AccessDriftRepaired,
            AccessAuditAction::PseudoViewDeleted,
        ] {
            assert_eq!(decode_action(action.as_str()).ok(), Some(action));
        }
        assert!(decode_action("access.exploded").is_err());
    }

    #[tokio::test]
    async fn history_lists_newest_events_first() {
        let Some(pool) = test_pool().await else {
            return;
        };

        let repository = PostgresAuditRepository::new(pool);
        let dataset_id = Uuid::new_v4();
        for action in [AccessAuditAction::AccessGranted, AccessAuditAction::AccessRevoked] {
            let appended = repository
                .append_event(AccessAuditEvent {
                    dataset_id: Some(dataset_id),
                    actor: RECONCILER_ACTOR.to_owned(),
                    subject: Some("user:alice@example.com".to_owned()),
                    action,
                    resource_id: Uuid::new_v4().to_string(),
                    detail: None,
                    created: None,
                })
                .await;
            assert!(appended.is_ok());
        }

        let events = repository
            .list_events_for_dataset(dataset_id, 10)
            .await
            .unwrap_or_default();
        let actions: Vec<AccessAuditAction> = events.iter().map(|event| event.action).collect();
        assert_eq!(
            actions,
            vec![AccessAuditAction::AccessRevoked, AccessAuditAction::AccessGranted]
        );
    }
}
