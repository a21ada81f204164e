use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use grantkeeper_application::{DirectoryBackend, DirectoryGroup};
use grantkeeper_core::{AppError, AppResult};
use grantkeeper_domain::Subject;
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::GcpRestClient;
use super::rest_client::api_url;

const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupsPage {
    #[serde(default)]
    groups: Vec<GroupEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    email: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone)]
struct CachedGroups {
    groups: Vec<DirectoryGroup>,
    fetched_at: Instant,
}

/// Group membership lookups through the Admin SDK directory API.
///
/// Results are cached per subject for one hour.
#[derive(Debug)]
pub struct GoogleGroupsDirectory {
    client: GcpRestClient,
    endpoint: String,
    cache: RwLock<HashMap<String, CachedGroups>>,
}

impl GoogleGroupsDirectory {
    /// Creates a directory client against the Admin SDK `endpoint`.
    #[must_use]
    pub fn new(client: GcpRestClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn cached_groups(&self, key: &str) -> Option<Vec<DirectoryGroup>> {
        self.cache
            .read()
            .await
            .get(key)
            .filter(|cached| cached.fetched_at.elapsed() < CACHE_TTL)
            .map(|cached| cached.groups.clone())
    }

    async fn fetch_groups(&self, user_key: &str) -> AppResult<Vec<DirectoryGroup>> {
        let mut groups = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = api_url(self.endpoint.as_str(), "groups")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("userKey", user_key);
                if let Some(token) = page_token.as_deref() {
                    query.append_pair("pageToken", token);
                }
            }

            let body = match self.client.send(Method::GET, url, None).await {
                Ok(body) => body,
                // Unknown directory members simply belong to no groups.
                Err(AppError::NotFound(_)) => return Ok(groups),
                Err(error) => return Err(error),
            };
            let page: GroupsPage = serde_json::from_value(body).map_err(|error| {
                AppError::Upstream(format!("invalid directory groups response: {error}"))
            })?;

            groups.extend(page.groups.into_iter().map(|group| DirectoryGroup {
                email: group.email.to_lowercase(),
                name: group.name,
            }));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(groups),
            }
        }
    }
}

#[async_trait]
impl DirectoryBackend for GoogleGroupsDirectory {
    async fn groups_for_subject(&self, subject: &Subject) -> AppResult<Vec<DirectoryGroup>> {
        let key = subject.identifier().to_owned();
        if let Some(groups) = self.cached_groups(key.as_str()).await {
            return Ok(groups);
        }

        let groups = self.fetch_groups(key.as_str()).await?;
        self.cache.write().await.insert(
            key,
            CachedGroups {
                groups: groups.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(groups)
    }
}
