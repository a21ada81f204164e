use std::sync::Arc;

use grantkeeper_core::{AppError, AppResult};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::GcpTokenSource;

/// Authenticated JSON client shared by the Google API adapters.
///
/// `404` maps to [`AppError::NotFound`] and `409` to [`AppError::Conflict`] so
/// adapters can treat those outcomes as idempotent successes where it fits.
/// Every other failure is [`AppError::Upstream`].
#[derive(Debug, Clone)]
pub struct GcpRestClient {
    http_client: reqwest::Client,
    tokens: Arc<GcpTokenSource>,
}

impl GcpRestClient {
    /// Creates a client; request timeouts come from `http_client`.
    #[must_use]
    pub fn new(http_client: reqwest::Client, tokens: Arc<GcpTokenSource>) -> Self {
        Self {
            http_client,
            tokens,
        }
    }

    /// Sends one request and decodes the JSON response; empty bodies decode to `Null`.
    pub(crate) async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> AppResult<Value> {
        let token = self.tokens.access_token().await?;
        let mut request = self
            .http_client
            .request(method.clone(), url.clone())
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|error| {
            AppError::Upstream(format!("{method} {} failed: {error}", url.path()))
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "<response body unavailable>".to_owned());
        debug!(%method, path = url.path(), %status, "gcp api call completed");

        match status {
            status if status.is_success() => {
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                serde_json::from_str(text.as_str()).map_err(|error| {
                    AppError::Upstream(format!(
                        "invalid json from {method} {}: {error}",
                        url.path()
                    ))
                })
            }
            StatusCode::NOT_FOUND => Err(AppError::NotFound(format!(
                "{method} {} returned not found",
                url.path()
            ))),
            StatusCode::CONFLICT => Err(AppError::Conflict(format!(
                "{method} {} returned conflict",
                url.path()
            ))),
            status => Err(AppError::Upstream(format!(
                "{method} {} failed with status {status}: {text}",
                url.path()
            ))),
        }
    }
}

/// Joins path segments onto an API base url.
pub(crate) fn api_url(base: &str, path: &str) -> AppResult<Url> {
    let joined = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse(joined.as_str())
        .map_err(|error| AppError::Internal(format!("invalid google api url '{joined}': {error}")))
}
