//! Injected HTTP collaborator
//!
//! The engine never owns an ambient HTTP client; everything that talks to an
//! endpoint goes through an [`HttpRequestor`] passed in at construction time.

use async_trait::async_trait;
use oxidc_types::{AuthError, AuthResult};
use std::collections::HashMap;

/// Minimal response shape the engine needs
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request/response exchange collaborator
#[async_trait]
pub trait HttpRequestor: Send + Sync {
    /// Perform a GET request.
    async fn get(&self, url: &str) -> AuthResult<HttpResponse>;

    /// Perform a form-urlencoded POST request.
    async fn post_form(
        &self,
        url: &str,
        params: &HashMap<String, String>,
    ) -> AuthResult<HttpResponse>;
}

/// reqwest-backed production requestor
pub struct ReqwestRequestor {
    client: reqwest::Client,
}

impl ReqwestRequestor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for ReqwestRequestor {
    fn default() -> Self {
        Self::new()
    }
}

async fn into_response(response: reqwest::Response) -> AuthResult<HttpResponse> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| AuthError::Transport(format!("failed to read response body: {}", e)))?;
    Ok(HttpResponse { status, body })
}

#[async_trait]
impl HttpRequestor for ReqwestRequestor {
    async fn get(&self, url: &str) -> AuthResult<HttpResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthError::Transport(format!("GET {} failed: {}", url, e)))?;
        into_response(response).await
    }

    async fn post_form(
        &self,
        url: &str,
        params: &HashMap<String, String>,
    ) -> AuthResult<HttpResponse> {
        let response = self
            .client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::Transport(format!("POST {} failed: {}", url, e)))?;
        into_response(response).await
    }
}
