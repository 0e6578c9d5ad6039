//! HTTP client for the NoteMemo sync API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::entity::SyncEntity;
use super::remote::{
    PushReceipt, RemoteError, RemoteResult, RemoteStore, RemoteSyncStatus, SyncStatusSource,
};
use crate::config::SyncConfig;
use crate::models::{DeviceId, Timestamp};
use crate::util::{compact_text, is_http_url, normalize_text_option, parse_iso, to_iso};

/// Header carrying the user's access code
pub const ACCESS_CODE_HEADER: &str = "x-access-code";
/// Header identifying the pushing device
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Remote store backed by the NoteMemo API.
///
/// The server derives the user scope from the access code, so the `user_id`
/// passed to the [`RemoteStore`] methods only shows up in logs. One client
/// serves every record kind; the path comes from the kind name.
#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    access_code: String,
    client: reqwest::Client,
}

impl fmt::Debug for HttpRemoteStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpRemoteStore")
            .field("base_url", &self.base_url)
            .field("access_code", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpRemoteStore {
    pub fn new(
        base_url: impl Into<String>,
        access_code: impl Into<String>,
        timeout: Duration,
    ) -> RemoteResult<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        let access_code = normalize_text_option(Some(access_code.into())).ok_or_else(|| {
            RemoteError::Unavailable("access code must not be empty".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            base_url,
            access_code,
            client,
        })
    }

    /// Build a client from sync settings, or `None` when sync is not configured
    pub fn from_config(config: &SyncConfig) -> RemoteResult<Option<Self>> {
        if !config.sync_enabled {
            return Ok(None);
        }
        let (Some(base_url), Some(access_code)) = (&config.api_base_url, &config.access_code)
        else {
            return Ok(None);
        };
        Self::new(base_url.clone(), access_code.clone(), config.fetch_timeout).map(Some)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn fetch<R: SyncEntity>(
        &self,
        user_id: &str,
        since: Option<Timestamp>,
    ) -> RemoteResult<Vec<R>> {
        let mut query = vec![("includeDeleted", "true".to_string())];
        if let Some(since) = since {
            query.push(("since", to_iso(&since)));
        }

        tracing::debug!(kind = %R::KIND, user_id, ?since, "Fetching remote records");
        let response = self
            .client
            .get(self.url(R::KIND.as_str()))
            .header(ACCESS_CODE_HEADER, &self.access_code)
            .header("Accept", "application/json")
            .query(&query)
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json::<Vec<R>>().await?)
    }
}

#[async_trait]
impl<R: SyncEntity> RemoteStore<R> for HttpRemoteStore {
    async fn read_all(&self, user_id: &str) -> RemoteResult<Vec<R>> {
        self.fetch(user_id, None).await
    }

    async fn read_updated_since(&self, user_id: &str, since: Timestamp) -> RemoteResult<Vec<R>> {
        self.fetch(user_id, Some(since)).await
    }

    async fn upsert_many(
        &self,
        user_id: &str,
        device: &DeviceId,
        records: &[R],
    ) -> RemoteResult<PushReceipt> {
        tracing::debug!(kind = %R::KIND, user_id, count = records.len(), "Pushing records");
        let response = self
            .client
            .post(self.url(R::KIND.as_str()))
            .header(ACCESS_CODE_HEADER, &self.access_code)
            .header(DEVICE_ID_HEADER, device.as_str())
            .json(records)
            .send()
            .await?;
        let response = check_status(response).await?;
        let payload = response.json::<PushResponse>().await?;
        payload.try_into()
    }
}

#[async_trait]
impl SyncStatusSource for HttpRemoteStore {
    async fn sync_status(&self) -> RemoteResult<RemoteSyncStatus> {
        let response = self
            .client
            .get(self.url("sync"))
            .header(ACCESS_CODE_HEADER, &self.access_code)
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json::<RemoteSyncStatus>().await?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushResponse {
    success: bool,
    sync_time: Option<String>,
    message: Option<String>,
}

impl TryFrom<PushResponse> for PushReceipt {
    type Error = RemoteError;

    fn try_from(value: PushResponse) -> RemoteResult<Self> {
        if !value.success {
            return Err(RemoteError::Api(
                value
                    .message
                    .unwrap_or_else(|| "push was not accepted".to_string()),
            ));
        }
        let sync_time = value
            .sync_time
            .as_deref()
            .and_then(parse_iso)
            .ok_or_else(|| {
                RemoteError::Malformed("response did not include a valid syncTime".to_string())
            })?;
        Ok(Self { sync_time })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

async fn check_status(response: reqwest::Response) -> RemoteResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = parse_api_error(status, &body);
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(RemoteError::Unauthorized(message))
    } else if status.is_server_error() {
        Err(RemoteError::Unavailable(message))
    } else {
        Err(RemoteError::Api(message))
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> RemoteResult<String> {
    let endpoint = normalize_text_option(Some(raw)).ok_or_else(|| {
        RemoteError::Unavailable("API base URL must not be empty".to_string())
    })?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::Unavailable(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_endpoint_rejects_invalid_values() {
        assert!(normalize_endpoint(String::new()).is_err());
        assert!(normalize_endpoint("notes.example.com".to_string()).is_err());
        assert_eq!(
            normalize_endpoint("https://notes.example.com/".to_string()).unwrap(),
            "https://notes.example.com"
        );
    }

    #[test]
    fn parse_api_error_prefers_json_message() {
        let message = parse_api_error(StatusCode::BAD_REQUEST, r#"{"error":"sync disabled"}"#);
        assert_eq!(message, "sync disabled (400)");
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn push_response_requires_sync_time() {
        let ok = PushResponse {
            success: true,
            sync_time: Some("2024-01-01T00:00:00.000Z".to_string()),
            message: None,
        };
        let receipt = PushReceipt::try_from(ok).unwrap();
        assert_eq!(receipt.sync_time, parse_iso("2024-01-01T00:00:00Z").unwrap());

        let missing = PushResponse {
            success: true,
            sync_time: None,
            message: None,
        };
        assert!(matches!(
            PushReceipt::try_from(missing),
            Err(RemoteError::Malformed(_))
        ));

        let rejected = PushResponse {
            success: false,
            sync_time: None,
            message: Some("nope".to_string()),
        };
        assert!(matches!(PushReceipt::try_from(rejected), Err(RemoteError::Api(_))));
    }

    #[test]
    fn debug_redacts_access_code() {
        let store =
            HttpRemoteStore::new("http://localhost:8080", "123456", Duration::from_secs(5))
                .unwrap();
        let debug = format!("{store:?}");
        assert!(!debug.contains("123456"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn from_config_requires_enabled_sync() {
        let disabled = SyncConfig::default();
        assert!(HttpRemoteStore::from_config(&disabled).unwrap().is_none());

        let enabled = SyncConfig {
            sync_enabled: true,
            api_base_url: Some("http://localhost:8080".to_string()),
            access_code: Some("123456".to_string()),
            ..SyncConfig::default()
        };
        assert!(HttpRemoteStore::from_config(&enabled).unwrap().is_some());
    }
}
