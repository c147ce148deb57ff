//! Token endpoint exchange and revocation

use crate::discovery::ServiceConfiguration;
use crate::requestor::HttpRequestor;
use crate::token::{RevokeTokenRequest, TokenRequest, TokenResponse, TokenResponseJson};
use async_trait::async_trait;
use chrono::Utc;
use oxidc_types::{AuthError, AuthResult};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Wire shape of an RFC 6749 token error body
#[derive(Debug, Deserialize)]
struct TokenErrorJson {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Token endpoint capability, mockable at the seam
///
/// Exchanges are stateless and may run concurrently. Callers must not run
/// two exchanges for the same refresh token at once: servers that rotate
/// refresh tokens invalidate the old one on first use.
#[async_trait]
pub trait TokenRequestHandler: Send + Sync {
    /// Exchange a code or refresh token for tokens.
    async fn perform_token_request(
        &self,
        configuration: &ServiceConfiguration,
        request: &TokenRequest,
    ) -> AuthResult<TokenResponse>;

    /// Revoke a token. Returns whether the server acknowledged the
    /// revocation.
    async fn perform_revoke_token_request(
        &self,
        configuration: &ServiceConfiguration,
        request: &RevokeTokenRequest,
    ) -> AuthResult<bool>;
}

/// Standard handler speaking form-urlencoded to the endpoints through the
/// injected requestor
pub struct BaseTokenRequestHandler {
    requestor: Arc<dyn HttpRequestor>,
}

impl BaseTokenRequestHandler {
    pub fn new(requestor: Arc<dyn HttpRequestor>) -> Self {
        Self { requestor }
    }
}

#[async_trait]
impl TokenRequestHandler for BaseTokenRequestHandler {
    async fn perform_token_request(
        &self,
        configuration: &ServiceConfiguration,
        request: &TokenRequest,
    ) -> AuthResult<TokenResponse> {
        // Local validation; nothing malformed reaches the wire
        request.validate()?;

        debug!(
            "Token request ({}) to {}",
            request.grant_type.as_str(),
            configuration.token_endpoint
        );
        let response = self
            .requestor
            .post_form(&configuration.token_endpoint, &request.to_form_params())
            .await?;

        if !response.is_success() {
            let error: TokenErrorJson = serde_json::from_str(&response.body).map_err(|_| {
                AuthError::Protocol(format!(
                    "token endpoint returned HTTP {} with an unrecognized body",
                    response.status
                ))
            })?;
            warn!("Token request rejected: {}", error.error);
            return Err(AuthError::TokenExchange {
                kind: error.error,
                description: error.error_description,
            });
        }

        let json: TokenResponseJson = serde_json::from_str(&response.body)
            .map_err(|e| AuthError::Protocol(format!("malformed token response: {}", e)))?;
        let access_token = json.access_token.ok_or_else(|| {
            AuthError::Protocol("token response is missing access_token".to_string())
        })?;

        info!("Token request succeeded");
        Ok(TokenResponse {
            access_token,
            token_type: json.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in: json.expires_in,
            refresh_token: json.refresh_token,
            id_token: json.id_token,
            scope: json.scope,
            // Stamped at capture time; servers do not send an issue time
            issued_at: Utc::now(),
        })
    }

    async fn perform_revoke_token_request(
        &self,
        configuration: &ServiceConfiguration,
        request: &RevokeTokenRequest,
    ) -> AuthResult<bool> {
        request.validate()?;

        let endpoint = configuration.revocation_endpoint.as_deref().ok_or_else(|| {
            AuthError::Configuration(
                "service configuration has no revocation endpoint".to_string(),
            )
        })?;

        debug!("Revocation request to {}", endpoint);
        let response = self
            .requestor
            .post_form(endpoint, &request.to_form_params())
            .await?;

        if response.is_success() {
            info!("Token revoked");
        } else {
            warn!("Revocation request returned HTTP {}", response.status);
        }
        Ok(response.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requestor::HttpResponse;
    use crate::token::GrantType;
    use std::collections::HashMap;

    struct CannedRequestor {
        status: u16,
        body: String,
    }

    #[async_trait]
    impl HttpRequestor for CannedRequestor {
        async fn get(&self, _url: &str) -> AuthResult<HttpResponse> {
            unreachable!("token requests are POSTs")
        }

        async fn post_form(
            &self,
            _url: &str,
            _params: &HashMap<String, String>,
        ) -> AuthResult<HttpResponse> {
            Ok(HttpResponse {
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    fn handler(status: u16, body: &str) -> BaseTokenRequestHandler {
        BaseTokenRequestHandler::new(Arc::new(CannedRequestor {
            status,
            body: body.to_string(),
        }))
    }

    fn test_configuration() -> ServiceConfiguration {
        ServiceConfiguration {
            authorization_endpoint: "https://idp.example/authorize".to_string(),
            token_endpoint: "https://idp.example/token".to_string(),
            revocation_endpoint: Some("https://idp.example/revoke".to_string()),
        }
    }

    fn code_request() -> TokenRequest {
        TokenRequest {
            client_id: "c1".to_string(),
            redirect_uri: "http://127.0.0.1:32111/callback".to_string(),
            grant_type: GrantType::AuthorizationCode,
            code: Some("abc123".to_string()),
            refresh_token: None,
            extras: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_successful_exchange_stamps_issued_at() {
        let handler = handler(
            200,
            r#"{"access_token": "tok", "token_type": "Bearer", "expires_in": 3600, "refresh_token": "ref"}"#,
        );
        let before = Utc::now();
        let response = handler
            .perform_token_request(&test_configuration(), &code_request())
            .await
            .unwrap();

        assert_eq!(response.access_token, "tok");
        assert_eq!(response.refresh_token.as_deref(), Some("ref"));
        assert!(response.issued_at >= before && response.issued_at <= Utc::now());
        assert_eq!(
            response.expires_at().unwrap(),
            response.issued_at + chrono::Duration::seconds(3600)
        );
    }

    #[tokio::test]
    async fn test_oauth_error_body_surfaces_kind() {
        let handler = handler(
            400,
            r#"{"error": "invalid_grant", "error_description": "code expired"}"#,
        );
        let err = handler
            .perform_token_request(&test_configuration(), &code_request())
            .await
            .unwrap_err();
        match err {
            AuthError::TokenExchange { kind, description } => {
                assert_eq!(kind, "invalid_grant");
                assert_eq!(description.as_deref(), Some("code expired"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unrecognized_failure_body_is_protocol_error() {
        let handler = handler(502, "<html>bad gateway</html>");
        let err = handler
            .perform_token_request(&test_configuration(), &code_request())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_success_without_access_token_is_protocol_error() {
        let handler = handler(200, r#"{"token_type": "Bearer"}"#);
        let err = handler
            .perform_token_request(&test_configuration(), &code_request())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_invalid_request_never_hits_the_wire() {
        // CannedRequestor would answer 200; validation must fail first
        let handler = handler(200, r#"{"access_token": "tok"}"#);
        let request = TokenRequest {
            code: None,
            ..code_request()
        };
        let err = handler
            .perform_token_request(&test_configuration(), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_revocation_acknowledged() {
        let handler = handler(200, "");
        let revoked = handler
            .perform_revoke_token_request(
                &test_configuration(),
                &RevokeTokenRequest {
                    token: "ref".to_string(),
                    client_id: Some("c1".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(revoked);
    }

    #[tokio::test]
    async fn test_revocation_without_endpoint_rejected() {
        let handler = handler(200, "");
        let configuration = ServiceConfiguration {
            revocation_endpoint: None,
            ..test_configuration()
        };
        let err = handler
            .perform_revoke_token_request(
                &configuration,
                &RevokeTokenRequest {
                    token: "ref".to_string(),
                    client_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }
}
