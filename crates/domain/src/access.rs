//! Dataset access grants and the requests that lead to them.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use grantkeeper_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Subject;

/// A subject's grant to read one dataset.
///
/// Rows are never deleted; closing a grant sets `revoked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    /// Stable access id.
    pub id: Uuid,
    /// Dataset the grant applies to.
    pub dataset_id: Uuid,
    /// Grantee in `type:identifier` form, as stored.
    pub subject: String,
    /// Subject who authorised the grant.
    pub granter: String,
    /// Expiry, `None` for perpetual access.
    pub expires: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Revocation timestamp, set once the grant is closed.
    pub revoked: Option<DateTime<Utc>>,
    /// Request this grant was approved from, if any.
    pub access_request_id: Option<Uuid>,
}

impl Access {
    /// Returns whether the grant is open and not past its expiry at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked.is_none() && self.expires.is_none_or(|expires| expires > now)
    }

    /// Returns whether the grant has expired but has not been revoked yet.
    #[must_use]
    pub fn is_expired_unrevoked(&self, now: DateTime<Utc>) -> bool {
        self.revoked.is_none() && self.expires.is_some_and(|expires| expires < now)
    }

    /// Parses the stored subject.
    pub fn parsed_subject(&self) -> AppResult<Subject> {
        Subject::parse(self.subject.as_str())
    }
}

/// Lifecycle state of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRequestStatus {
    /// Waiting for a dataset owner.
    Pending,
    /// Approved; an access row exists.
    Approved,
    /// Denied by a dataset owner.
    Denied,
}

impl AccessRequestStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }
}

impl FromStr for AccessRequestStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            _ => Err(AppError::Validation(format!(
                "unknown access request status '{value}'"
            ))),
        }
    }
}

/// A pending or closed request for dataset access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    /// Stable request id.
    pub id: Uuid,
    /// Requested dataset.
    pub dataset_id: Uuid,
    /// Subject that should receive access, with type prefix.
    pub subject: String,
    /// Owner of the request (`user:` or `group:` subject).
    pub owner: String,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Current status.
    pub status: AccessRequestStatus,
    /// Timestamp of approval or denial.
    pub closed: Option<DateTime<Utc>>,
    /// Desired expiry of the resulting grant.
    pub expires: Option<DateTime<Utc>>,
    /// Who approved or denied the request.
    pub granter: Option<String>,
    /// Denial reason.
    pub reason: Option<String>,
    /// Linked documentation record.
    pub documentation_id: Option<Uuid>,
}

impl AccessRequest {
    /// Fails unless the request is still pending.
    pub fn ensure_pending(&self) -> AppResult<()> {
        if self.status != AccessRequestStatus::Pending {
            return Err(AppError::Conflict(format!(
                "access request '{}' is already {}",
                self.id,
                self.status.as_str()
            )));
        }

        Ok(())
    }
}

/// Rejects expiries that are already in the past.
pub fn validate_expiry(expires: Option<DateTime<Utc>>, now: DateTime<Utc>) -> AppResult<()> {
    match expires {
        Some(expires) if expires <= now => Err(AppError::Validation(format!(
            "expiry '{}' is in the past",
            expires.to_rfc3339()
        ))),
        _ => Ok(()),
    }
}
