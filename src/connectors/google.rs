//! Shared Google API plumbing: authorized requests and status classification.

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::connectors::ConnectorError;
use crate::models::Provider;

/// Used when a throttled response carries no `Retry-After`
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// 403 bodies Google uses for quota exhaustion rather than a permission problem
const QUOTA_ERROR_PATTERNS: &[&str] = &[
    "userratelimitexceeded",
    "ratelimitexceeded",
    "quotaexceeded",
    "servicelimit",
    "daily limit",
    "billing limit",
];

fn retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

/// Sends `request` with the bearer token and maps non-success statuses onto
/// the connector taxonomy.
pub async fn send(
    provider: Provider,
    request: RequestBuilder,
    access_token: &str,
) -> Result<Response, ConnectorError> {
    let response = request
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| ConnectorError::ProviderUnavailable {
            provider,
            details: format!("request failed: {}", e),
        })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ConnectorError::ProviderRateLimited {
            provider,
            retry_after_secs: retry_after(&response).unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        });
    }

    if status == StatusCode::UNAUTHORIZED {
        return Err(ConnectorError::Unauthorized { provider });
    }

    if status == StatusCode::FORBIDDEN {
        let retry_after_header = retry_after(&response);
        let body = response.text().await.unwrap_or_default();
        let body_lower = body.to_lowercase();

        if QUOTA_ERROR_PATTERNS
            .iter()
            .any(|pattern| body_lower.contains(pattern))
        {
            return Err(ConnectorError::ProviderRateLimited {
                provider,
                retry_after_secs: retry_after_header.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            });
        }
        return Err(ConnectorError::Unauthorized { provider });
    }

    let body = response.text().await.unwrap_or_default();
    Err(ConnectorError::ProviderUnavailable {
        provider,
        details: format!("status {}: {}", status, truncate(&body, 200)),
    })
}

/// Decodes a JSON page; a body that does not parse fails the whole fetch
pub async fn json<T: DeserializeOwned>(
    provider: Provider,
    response: Response,
) -> Result<T, ConnectorError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ConnectorError::ValidationFailure {
            provider,
            details: format!("unexpected response body: {}", e),
        })
}

fn truncate(body: &str, max_chars: usize) -> String {
    if body.chars().count() > max_chars {
        let head: String = body.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        body.to_string()
    }
}
