//! JSON/HTTP payment backend client.
//!
//! # Responsibilities
//! - Map the three backend operations onto HTTP endpoints
//! - Enforce connect and request timeouts on every call
//! - Classify failures (unreachable vs. timeout vs. rejection)

use async_trait::async_trait;
use reqwest::{redirect, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::backend::types::{
    BackendError, BackendResult, CreatedSession, Plan, SessionId, StatusReport,
};
use crate::backend::PaymentBackend;
use crate::config::BackendConfig;
use crate::quoting::Quote;

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    plan: Plan,
    payer_email: &'a str,
}

/// Payment backend reached over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    config: BackendConfig,
}

impl HttpBackend {
    /// Create a new HTTP backend client.
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        let mut base_url: Url = config.base_url.parse().map_err(|e| {
            BackendError::InvalidResponse(format!("Invalid backend URL '{}': {}", config.base_url, e))
        })?;
        // Url::join replaces the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            // A redirect is an answer from a live backend, surfaced as a rejection
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| BackendError::Unreachable(format!("Failed to build HTTP client: {}", e)))?;

        tracing::info!(base_url = %base_url, "Payment backend client initialized");

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    fn endpoint(&self, path: &str) -> BackendResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::InvalidResponse(format!("Invalid endpoint '{}': {}", path, e)))
    }

    /// Only a failure to connect counts as unreachable. Anything after the
    /// connection was made means a backend answered.
    fn classify(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.config.request_timeout_secs)
        } else if err.is_connect() {
            BackendError::Unreachable(err.to_string())
        } else if let Some(status) = err.status() {
            BackendError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            BackendError::InvalidResponse(err.to_string())
        }
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        response: Response,
        session_id: Option<&SessionId>,
    ) -> BackendResult<T> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| self.classify(e));
        }

        let message = response.text().await.unwrap_or_default();
        Err(match (status, session_id) {
            (StatusCode::NOT_FOUND, Some(id)) => BackendError::NotFound(id.clone()),
            (StatusCode::CONFLICT | StatusCode::GONE, Some(id)) => {
                BackendError::InvalidSessionState(id.clone())
            }
            _ => BackendError::Rejected {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl PaymentBackend for HttpBackend {
    async fn create_session(&self, plan: Plan, payer_email: &str) -> BackendResult<CreatedSession> {
        let url = self.endpoint("api/payments/sessions")?;
        let response = self
            .client
            .post(url)
            .json(&CreateSessionRequest { plan, payer_email })
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.decode(response, None).await
    }

    async fn refresh_quote(&self, session_id: &SessionId) -> BackendResult<Quote> {
        let url = self.endpoint(&format!("api/payments/sessions/{}/quote", session_id))?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.decode(response, Some(session_id)).await
    }

    async fn get_status(&self, session_id: &SessionId) -> BackendResult<StatusReport> {
        let url = self.endpoint(&format!("api/payments/sessions/{}/status", session_id))?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.decode(response, Some(session_id)).await
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url.as_str())
            .field("timeout_secs", &self.config.request_timeout_secs)
            .finish()
    }
}
