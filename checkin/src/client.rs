//! HTTP check-in backend.
//!
//! Calls the backend's RPC endpoint `POST {base_url}/rest/v1/rpc/{function}`
//! with the project's anon key and, when signed in, the member's session
//! token.

use crate::config::BackendConfig;
use crate::dispatcher::{
    CheckInRequest, CheckInResponse, CheckInService, RemoteError, ServiceError, ServiceFuture,
};
use reqwest::{Client, StatusCode};
use std::time::Duration;

const MAX_ERROR_BODY: usize = 512;

/// Check-in backend reached over HTTP
#[derive(Clone)]
pub struct HttpCheckInService {
    client: Client,
    endpoint: String,
    anon_key: String,
    access_token: Option<String>,
}

impl HttpCheckInService {
    /// Create a client for the RPC `function` under `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        function: &str,
        anon_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/rpc/{function}", base_url.trim_end_matches('/')),
            anon_key: anon_key.into(),
            access_token: None,
        })
    }

    /// Create a client from backend configuration
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ServiceError> {
        let service = Self::new(
            &config.base_url,
            &config.checkin_function,
            config.anon_key.clone(),
            config.request_timeout,
        )?;

        Ok(match &config.access_token {
            Some(token) => service.with_access_token(token.clone()),
            None => service,
        })
    }

    /// Authenticate as a signed-in member instead of the anon role
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Full URL of the RPC endpoint
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, request: CheckInRequest) -> Result<CheckInResponse, ServiceError> {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);

        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        tracing::debug!(status = status.as_u16(), "Check-in backend responded");

        match status {
            s if s.is_success() => serde_json::from_str::<CheckInResponse>(&body)
                .map_err(|e| ServiceError::Decode(e.to_string())),
            StatusCode::CONFLICT => Ok(CheckInResponse::failure(
                "ALREADY_REGISTERED",
                remote_message(&body),
            )),
            // A coded 404 may be about the endpoint rather than the event.
            StatusCode::NOT_FOUND => Ok(match remote_error(&body) {
                Some(error) => CheckInResponse {
                    success: false,
                    data: None,
                    error: Some(error),
                },
                None => CheckInResponse::failure("NOT_FOUND", truncate(body)),
            }),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                match remote_error(&body) {
                    Some(error) => Ok(CheckInResponse {
                        success: false,
                        data: None,
                        error: Some(error),
                    }),
                    None => Err(ServiceError::Status {
                        status: status.as_u16(),
                        body: truncate(body),
                    }),
                }
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ServiceError::Unauthorized {
                status: status.as_u16(),
            }),
            _ => Err(ServiceError::Status {
                status: status.as_u16(),
                body: truncate(body),
            }),
        }
    }
}

impl CheckInService for HttpCheckInService {
    fn check_in(&self, request: CheckInRequest) -> ServiceFuture {
        let service = self.clone();
        Box::pin(async move { service.call(request).await })
    }
}

impl std::fmt::Debug for HttpCheckInService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCheckInService")
            .field("endpoint", &self.endpoint)
            .field("authenticated", &self.access_token.is_some())
            .finish_non_exhaustive()
    }
}

fn transport_error(error: reqwest::Error) -> ServiceError {
    if error.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Transport(error.to_string())
    }
}

/// Error body in either the RPC envelope or the bare `{code, message}` form
fn remote_error(body: &str) -> Option<RemoteError> {
    if let Ok(CheckInResponse {
        error: Some(error), ..
    }) = serde_json::from_str::<CheckInResponse>(body)
    {
        return Some(error);
    }
    serde_json::from_str::<RemoteError>(body).ok()
}

fn remote_message(body: &str) -> String {
    remote_error(body).map_or_else(|| truncate(body.to_owned()), |error| error.message)
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
