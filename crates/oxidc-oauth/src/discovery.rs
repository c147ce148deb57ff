//! Authorization service configuration and issuer discovery

use crate::requestor::HttpRequestor;
use oxidc_types::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Path of the OpenID Connect discovery document relative to the issuer.
const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";

/// Endpoint set the engine talks to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfiguration {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
}

impl ServiceConfiguration {
    /// Fetch the endpoint set from an issuer's discovery document.
    ///
    /// Reads `<issuer>/.well-known/openid-configuration` through the injected
    /// requestor. Fields beyond the three endpoints are ignored.
    pub async fn fetch_from_issuer(
        issuer: &str,
        requestor: &dyn HttpRequestor,
    ) -> AuthResult<Self> {
        let url = format!("{}/{}", issuer.trim_end_matches('/'), WELL_KNOWN_PATH);
        debug!("Fetching service configuration from {}", url);

        let response = requestor.get(&url).await?;
        if !response.is_success() {
            return Err(AuthError::Transport(format!(
                "discovery request to {} returned HTTP {}",
                url, response.status
            )));
        }

        serde_json::from_str(&response.body).map_err(|e| {
            AuthError::Protocol(format!("malformed discovery document from {}: {}", url, e))
        })
    }
}
