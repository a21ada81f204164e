use serde::{Deserialize, Serialize};

/// Stable audit actions emitted by access use-cases and reconcilers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAuditAction {
    /// Emitted when access is granted directly or through approval.
    AccessGranted,
    /// Emitted when access is revoked by a user or on expiry.
    AccessRevoked,
    /// Emitted when the reconciler re-asserts a grant missing in IAM.
    AccessDriftRepaired,
    /// Emitted when an access request is created.
    AccessRequestCreated,
    /// Emitted when a pending access request is changed.
    AccessRequestUpdated,
    /// Emitted when a pending access request is withdrawn.
    AccessRequestDeleted,
    /// Emitted when an access request is approved.
    AccessRequestApproved,
    /// Emitted when an access request is denied.
    AccessRequestDenied,
    /// Emitted when an expired joinable view is dropped.
    JoinableViewDeleted,
    /// Emitted when a pseudonymized view without a dataset is dropped.
    PseudoViewDeleted,
}

impl AccessAuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessGranted => "access.granted",
            Self::AccessRevoked => "access.revoked",
            Self::AccessDriftRepaired => "access.drift_repaired",
            Self::AccessRequestCreated => "access_request.created",
            Self::AccessRequestUpdated => "access_request.updated",
            Self::AccessRequestDeleted => "access_request.deleted",
            Self::AccessRequestApproved => "access_request.approved",
            Self::AccessRequestDenied => "access_request.denied",
            Self::JoinableViewDeleted => "joinable_view.deleted",
            Self::PseudoViewDeleted => "pseudo_view.deleted",
        }
    }
}
