use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grantkeeper_application::GrantBackend;
use grantkeeper_core::{AppError, AppResult};
use grantkeeper_domain::{BigQueryCoordinates, Subject};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use super::GcpRestClient;
use super::rest_client::api_url;

const DATA_VIEWER_ROLE: &str = "roles/bigquery.dataViewer";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IamPolicy {
    #[serde(default)]
    bindings: Vec<IamBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<i64>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct IamBinding {
    role: String,
    #[serde(default)]
    members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<Value>,
}

impl IamPolicy {
    fn has_member(&self, role: &str, member: &str) -> bool {
        self.bindings.iter().any(|binding| {
            binding.role == role
                && binding.condition.is_none()
                && binding
                    .members
                    .iter()
                    .any(|existing| existing.eq_ignore_ascii_case(member))
        })
    }

    /// Returns whether the policy changed.
    fn add_member(&mut self, role: &str, member: &str) -> bool {
        if self.has_member(role, member) {
            return false;
        }

        match self
            .bindings
            .iter_mut()
            .find(|binding| binding.role == role && binding.condition.is_none())
        {
            Some(binding) => binding.members.push(member.to_owned()),
            None => self.bindings.push(IamBinding {
                role: role.to_owned(),
                members: vec![member.to_owned()],
                condition: None,
            }),
        }
        true
    }

    /// Returns whether the policy changed.
    fn remove_member(&mut self, role: &str, member: &str) -> bool {
        let mut changed = false;
        for binding in self
            .bindings
            .iter_mut()
            .filter(|binding| binding.role == role && binding.condition.is_none())
        {
            let before = binding.members.len();
            binding
                .members
                .retain(|existing| !existing.eq_ignore_ascii_case(member));
            changed |= binding.members.len() != before;
        }
        self.bindings.retain(|binding| !binding.members.is_empty());
        changed
    }
}

/// Grants read access by editing the IAM policy of one BigQuery table or view.
#[derive(Debug, Clone)]
pub struct BigQueryIamGrantBackend {
    client: GcpRestClient,
    endpoint: String,
}

impl BigQueryIamGrantBackend {
    /// Creates a backend against the BigQuery v2 REST `endpoint`.
    #[must_use]
    pub fn new(client: GcpRestClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn policy_url(&self, resource: &BigQueryCoordinates, verb: &str) -> AppResult<Url> {
        api_url(
            self.endpoint.as_str(),
            format!(
                "projects/{}/datasets/{}/tables/{}:{verb}",
                resource.project_id, resource.dataset, resource.table
            )
            .as_str(),
        )
    }

    async fn get_policy(&self, resource: &BigQueryCoordinates) -> AppResult<IamPolicy> {
        let url = self.policy_url(resource, "getIamPolicy")?;
        let body = self
            .client
            .send(Method::POST, url, Some(&json!({})))
            .await?;
        serde_json::from_value(body).map_err(|error| {
            AppError::Upstream(format!("invalid iam policy for '{resource}': {error}"))
        })
    }

    async fn set_policy(&self, resource: &BigQueryCoordinates, policy: &IamPolicy) -> AppResult<()> {
        let url = self.policy_url(resource, "setIamPolicy")?;
        self.client
            .send(Method::POST, url, Some(&json!({ "policy": policy })))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl GrantBackend for BigQueryIamGrantBackend {
    async fn grant(
        &self,
        resource: &BigQueryCoordinates,
        subject: &Subject,
        expires: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let member = subject.to_string();
        let mut policy = self.get_policy(resource).await?;
        if !policy.add_member(DATA_VIEWER_ROLE, member.as_str()) {
            debug!(resource = %resource, subject = %member, "subject already holds read access");
            return Ok(());
        }

        self.set_policy(resource, &policy).await?;
        info!(
            resource = %resource,
            subject = %member,
            expires = ?expires,
            "granted bigquery read access"
        );
        Ok(())
    }

    async fn revoke(&self, resource: &BigQueryCoordinates, subject: &Subject) -> AppResult<()> {
        let member = subject.to_string();
        let mut policy = match self.get_policy(resource).await {
            Ok(policy) => policy,
            Err(AppError::NotFound(_)) => {
                debug!(resource = %resource, "resource is gone, nothing to revoke");
                return Ok(());
            }
            Err(error) => return Err(error),
        };
        if !policy.remove_member(DATA_VIEWER_ROLE, member.as_str()) {
            return Ok(());
        }

        self.set_policy(resource, &policy).await?;
        info!(resource = %resource, subject = %member, "revoked bigquery read access");
        Ok(())
    }

    async fn check_access(
        &self,
        resource: &BigQueryCoordinates,
        subject: &Subject,
    ) -> AppResult<bool> {
        let policy = self.get_policy(resource).await?;
        Ok(policy.has_member(DATA_VIEWER_ROLE, subject.to_string().as_str()))
    }
}
