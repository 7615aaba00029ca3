//! HTTP client for the metadata/access service.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::service::{FileAccessRequest, FileAccessResponse, MetadataService};
use crate::api::ConnectionInfo;
use crate::error::ServiceError;

/// Path of the file access call, relative to the service base URL.
pub const FILE_ACCESS_PATH: &str = "WsDfu/FileAccess.json";

/// Build a configured HTTP client from the given connection.
pub fn build_http_client(connection: &ConnectionInfo) -> Result<Client, ServiceError> {
    let headers = header::HeaderMap::from_iter([
        (
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        ),
        (
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        ),
    ]);

    let client = Client::builder()
        .default_headers(headers)
        .timeout(connection.timeout)
        .connect_timeout(connection.connect_timeout)
        .build()?;

    Ok(client)
}

/// Execute a request, retrying server errors and transport failures.
///
/// Retries up to `max_retries` times with linear backoff:
/// delay = `retry_base_delay * attempt`, saturating.
pub async fn execute_with_retry<F, Fut>(
    connection: &ConnectionInfo,
    f: F,
) -> Result<Response, ServiceError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    let max_retries = connection.max_retries;
    for retry in 0..=max_retries {
        match f().await {
            Ok(response) if !response.status().is_server_error() => return Ok(response),
            Ok(response) if retry < max_retries => {
                warn!(
                    "Server error {}, retrying (attempt {}/{})",
                    response.status(),
                    retry + 1,
                    max_retries
                );
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Server error".to_string());
                return Err(ServiceError::ApiError { status, message });
            }
            Err(e) if retry < max_retries => {
                warn!(
                    "Request failed, retrying (attempt {}/{}): {}",
                    retry + 1,
                    max_retries,
                    e
                );
            }
            Err(e) => return Err(ServiceError::from(e)),
        }

        tokio::time::sleep(backoff_delay(connection.retry_base_delay, retry)).await;
    }

    Err(ServiceError::MaxRetriesExceeded)
}

fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(retry.saturating_add(1))
}

/// Check the status and deserialize a JSON body.
pub async fn handle_response<T>(response: Response) -> Result<T, ServiceError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();

    if status.is_success() {
        response.json::<T>().await.map_err(ServiceError::from)
    } else {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        match status {
            StatusCode::UNAUTHORIZED => Err(ServiceError::AuthenticationFailed),
            StatusCode::NOT_FOUND => Err(ServiceError::ApiError {
                status: status.as_u16(),
                message: format!("Resource not found: {}", error_body),
            }),
            _ => Err(ServiceError::ApiError {
                status: status.as_u16(),
                message: error_body,
            }),
        }
    }
}

/// Interpret a file access body.
///
/// Accepts the bare response object or one wrapped in a
/// `FileAccessResponse` envelope. Service exceptions reported in a
/// successful body become `ApiError`.
fn parse_file_access(body: Value) -> Result<FileAccessResponse, ServiceError> {
    let body = match body {
        Value::Object(mut obj) if obj.len() == 1 && obj.contains_key("FileAccessResponse") => obj
            .remove("FileAccessResponse")
            .unwrap_or(Value::Null),
        other => other,
    };
    if let Some(exceptions) = body.get("Exceptions") {
        return Err(ServiceError::ApiError {
            status: StatusCode::OK.as_u16(),
            message: exceptions.to_string(),
        });
    }
    serde_json::from_value(body).map_err(|e| ServiceError::InvalidResponse(e.to_string()))
}

/// Metadata service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpMetadataService {
    http_client: Client,
    connection: ConnectionInfo,
    endpoint: Url,
}

impl HttpMetadataService {
    /// Create a new client from [`ConnectionInfo`].
    pub fn new(connection: ConnectionInfo) -> Result<Self, ServiceError> {
        let http_client = build_http_client(&connection)?;
        Self::with_http_client(http_client, connection)
    }

    /// Create from an existing reqwest Client.
    pub fn with_http_client(
        http_client: Client,
        connection: ConnectionInfo,
    ) -> Result<Self, ServiceError> {
        let endpoint = connection.base_url.join(FILE_ACCESS_PATH)?;
        Ok(Self {
            http_client,
            connection,
            endpoint,
        })
    }

    /// URL of the file access call.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl MetadataService for HttpMetadataService {
    async fn file_access(
        &self,
        request: &FileAccessRequest,
    ) -> Result<FileAccessResponse, ServiceError> {
        debug!(
            endpoint = %self.endpoint,
            file = %request.file_name,
            request_id = %request.request_id,
            access = %request.access_type,
            "Requesting file access"
        );

        let response = execute_with_retry(&self.connection, || {
            let mut builder = self.http_client.post(self.endpoint.clone()).json(request);
            if let Some(user) = &self.connection.user {
                builder = builder.basic_auth(user, self.connection.password.as_ref());
            }
            builder.send()
        })
        .await?;

        let body: Value = handle_response(response).await?;
        parse_file_access(body)
    }
}
