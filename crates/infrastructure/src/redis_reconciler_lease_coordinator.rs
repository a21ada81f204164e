//! Redis-backed distributed lease coordinator for reconciler replicas.

use async_trait::async_trait;
use grantkeeper_application::{ReconcilerLease, ReconcilerLeaseCoordinator};
use grantkeeper_core::{AppError, AppResult};
use redis::{AsyncCommands, Script};

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of reconciler lease coordination.
#[derive(Clone)]
pub struct RedisReconcilerLeaseCoordinator {
    client: redis::Client,
    key_prefix: String,
}

impl RedisReconcilerLeaseCoordinator {
    /// Creates one coordinator adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, scope_key: &str) -> String {
        format!("{}:{scope_key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

fn validate_lease_request(scope_key: &str, holder_id: &str, lease_seconds: u32) -> AppResult<()> {
    if scope_key.trim().is_empty() {
        return Err(AppError::Validation(
            "reconciler lease scope_key must not be empty".to_owned(),
        ));
    }

    if holder_id.trim().is_empty() {
        return Err(AppError::Validation(
            "reconciler lease holder_id must not be empty".to_owned(),
        ));
    }

    if lease_seconds == 0 {
        return Err(AppError::Validation(
            "reconciler lease_seconds must be greater than zero".to_owned(),
        ));
    }

    Ok(())
}

#[async_trait]
impl ReconcilerLeaseCoordinator for RedisReconcilerLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<ReconcilerLease>> {
        validate_lease_request(scope_key, holder_id, lease_seconds)?;

        let key = self.key_for(scope_key);
        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let mut connection = self.connection().await?;

        let acquired: bool = connection
            .set_nx(key.as_str(), token.as_str())
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acquire reconciler lease: {error}"))
            })?;

        if !acquired {
            return Ok(None);
        }

        connection
            .expire::<_, ()>(key.as_str(), i64::from(lease_seconds))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to set reconciler lease ttl: {error}"))
            })?;

        Ok(Some(ReconcilerLease {
            scope_key: scope_key.to_owned(),
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release_lease(&self, lease: &ReconcilerLease) -> AppResult<()> {
        let key = self.key_for(lease.scope_key.as_str());
        let mut connection = self.connection().await?;

        Script::new(RELEASE_LEASE_SCRIPT)
            .key(key)
            .arg(lease.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to release reconciler lease: {error}"))
            })?;

        Ok(())
    }
}
