// tutormesh-server/src/sidecar.rs
// ============================================================================
// Module: Sidecar Clients
// Description: HTTP clients for the sidecar invocation plane and the LLM.
// Purpose: Implement the core invoker and classifier seams over reqwest.
// Dependencies: reqwest, tutormesh-core, url
// ============================================================================

//! ## Overview
//! The control plane never opens direct connections to peer agents: every
//! invocation goes through the local sidecar's uniform
//! `invoke(target, method, body, deadline)` primitive, here spoken over
//! HTTP. Response statuses are classified for the retry policy: connection
//! errors, timeouts, 408/429, and 5xx are transient; other 4xx are
//! permanent. The optional LLM classifier speaks the same HTTP client and is
//! never authoritative on failure.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tutormesh_core::AgentId;
use tutormesh_core::AgentInvoker;
use tutormesh_core::Classification;
use tutormesh_core::InvokeError;
use tutormesh_core::LlmClassifier;
use tutormesh_core::LlmError;
use url::Url;

// ============================================================================
// SECTION: Sidecar Invoker
// ============================================================================

/// HTTP client for the local sidecar invocation plane.
pub struct HttpSidecarInvoker {
    /// Sidecar base endpoint.
    base: Url,
    /// Shared HTTP client.
    client: reqwest::Client,
}

impl HttpSidecarInvoker {
    /// Creates an invoker over the sidecar HTTP endpoint.
    #[must_use]
    pub fn new(base: Url) -> Self {
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }

    /// Builds the invocation URL for a target and method.
    fn invoke_url(&self, target: &AgentId, method: &str) -> Result<Url, InvokeError> {
        self.base
            .join(&format!("v1.0/invoke/{target}/method/{method}"))
            .map_err(|error| InvokeError::Permanent(format!("invalid invoke url: {error}")))
    }
}

#[async_trait]
impl AgentInvoker for HttpSidecarInvoker {
    async fn invoke(
        &self,
        target: &AgentId,
        method: &str,
        body: &Value,
        deadline: Duration,
    ) -> Result<Value, InvokeError> {
        let url = self.invoke_url(target, method)?;
        let response = self
            .client
            .post(url)
            .timeout(deadline)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|error| InvokeError::Permanent(format!("invalid agent response: {error}")));
        }
        if status.is_server_error()
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            return Err(InvokeError::Transient(format!("upstream status {status}")));
        }
        Err(InvokeError::Permanent(format!("upstream status {status}")))
    }

    async fn probe(&self, deadline: Duration) -> Result<(), InvokeError> {
        let url = self
            .base
            .join("v1.0/healthz")
            .map_err(|error| InvokeError::Permanent(format!("invalid probe url: {error}")))?;
        let response = self
            .client
            .get(url)
            .timeout(deadline)
            .send()
            .await
            .map_err(classify_transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(InvokeError::Transient(format!("sidecar status {}", response.status())))
        }
    }
}

/// Classifies a reqwest transport error for the retry policy.
fn classify_transport_error(error: reqwest::Error) -> InvokeError {
    if error.is_timeout() {
        InvokeError::Timeout
    } else {
        InvokeError::Transient(error.to_string())
    }
}

// ============================================================================
// SECTION: LLM Classifier
// ============================================================================

/// HTTP client for the optional LLM classifier endpoint.
pub struct HttpLlmClassifier {
    /// Classifier endpoint.
    endpoint: Url,
    /// Shared HTTP client.
    client: reqwest::Client,
}

impl HttpLlmClassifier {
    /// Creates a classifier client over the configured endpoint.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClassifier for HttpLlmClassifier {
    async fn classify(&self, query: &str) -> Result<Classification, LlmError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|error| LlmError::Classifier(error.to_string()))?;
        if !response.status().is_success() {
            return Err(LlmError::Classifier(format!("status {}", response.status())));
        }
        response
            .json::<Classification>()
            .await
            .map_err(|error| LlmError::Classifier(error.to_string()))
    }
}
