use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use grantkeeper_core::AppResult;
use grantkeeper_domain::AccessAuditAction;

/// Access history entry for one change to grants, requests or views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessAuditEvent {
    /// Dataset the change concerns, when there is one.
    pub dataset_id: Option<Uuid>,
    /// Subject that performed the action.
    pub actor: String,
    /// Subject whose access changed.
    pub subject: Option<String>,
    /// Stable action identifier.
    pub action: AccessAuditAction,
    /// Identifier of the changed row or resource.
    pub resource_id: String,
    /// Optional human-readable detail.
    pub detail: Option<String>,
    /// Event time; `None` lets the store stamp it.
    pub created: Option<DateTime<Utc>>,
}

/// Repository port for the append-only access history.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Appends a single audit event.
    async fn append_event(&self, event: AccessAuditEvent) -> AppResult<()>;

    /// Lists events for one dataset, newest first.
    async fn list_events_for_dataset(
        &self,
        dataset_id: Uuid,
        limit: usize,
    ) -> AppResult<Vec<AccessAuditEvent>>;
}
