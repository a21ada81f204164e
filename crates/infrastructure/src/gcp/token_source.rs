use std::time::Duration;

use grantkeeper_core::{AppError, AppResult};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug)]
enum TokenKind {
    Static(String),
    MetadataServer {
        http_client: reqwest::Client,
        cached: Mutex<Option<CachedToken>>,
    },
}

/// OAuth access tokens for Google APIs.
///
/// Either a fixed token from configuration or tokens fetched from the
/// instance metadata server and cached until shortly before they expire.
#[derive(Debug)]
pub struct GcpTokenSource {
    kind: TokenKind,
}

impl GcpTokenSource {
    /// Uses one pre-issued token for every request.
    #[must_use]
    pub fn from_static(token: impl Into<String>) -> Self {
        Self {
            kind: TokenKind::Static(token.into()),
        }
    }

    /// Fetches tokens for the default service account from the metadata server.
    #[must_use]
    pub fn from_metadata_server(http_client: reqwest::Client) -> Self {
        Self {
            kind: TokenKind::MetadataServer {
                http_client,
                cached: Mutex::new(None),
            },
        }
    }

    /// Returns a bearer token valid for at least the refresh margin.
    pub async fn access_token(&self) -> AppResult<String> {
        let (http_client, cached) = match &self.kind {
            TokenKind::Static(token) => return Ok(token.clone()),
            TokenKind::MetadataServer {
                http_client,
                cached,
            } => (http_client, cached),
        };

        let mut cached = cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.refresh_at > Instant::now()) {
            return Ok(token.value.clone());
        }

        let response = http_client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|error| {
                AppError::Upstream(format!("failed to reach gcp metadata server: {error}"))
            })?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "gcp metadata server returned status {}",
                response.status()
            )));
        }

        let token = response
            .json::<MetadataTokenResponse>()
            .await
            .map_err(|error| {
                AppError::Upstream(format!("invalid gcp metadata token response: {error}"))
            })?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(REFRESH_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::GcpTokenSource;

    #[tokio::test]
    async fn static_tokens_are_returned_verbatim() {
        let source = GcpTokenSource::from_static("ya29.token");
        assert_eq!(
            source.access_token().await.unwrap_or_default(),
            "ya29.token".to_owned()
        );
    }
}
