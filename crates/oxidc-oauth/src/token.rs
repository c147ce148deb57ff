//! Token endpoint request and response value objects

use chrono::{DateTime, Duration, Utc};
use oxidc_types::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// OAuth2 grant type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

/// A token endpoint request
///
/// Exactly one of `code` (grant `authorization_code`) or `refresh_token`
/// (grant `refresh_token`) is set. For a PKCE-protected code exchange the
/// caller threads the original request's verifier in as
/// `extras["code_verifier"]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub grant_type: GrantType,
    pub code: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub extras: HashMap<String, String>,
}

impl TokenRequest {
    /// Validate required fields for the grant type.
    ///
    /// Runs before any network call; a violation never reaches the wire.
    pub fn validate(&self) -> AuthResult<()> {
        if self.client_id.is_empty() {
            return Err(AuthError::Configuration(
                "client_id must not be empty".to_string(),
            ));
        }
        if self.redirect_uri.is_empty() {
            return Err(AuthError::Configuration(
                "redirect_uri must not be empty".to_string(),
            ));
        }
        match self.grant_type {
            GrantType::AuthorizationCode => {
                if self.code.as_deref().unwrap_or_default().is_empty() {
                    return Err(AuthError::Configuration(
                        "authorization_code grant requires a code".to_string(),
                    ));
                }
                if self.refresh_token.is_some() {
                    return Err(AuthError::Configuration(
                        "authorization_code grant must not carry a refresh_token".to_string(),
                    ));
                }
            }
            GrantType::RefreshToken => {
                if self.refresh_token.as_deref().unwrap_or_default().is_empty() {
                    return Err(AuthError::Configuration(
                        "refresh_token grant requires a refresh_token".to_string(),
                    ));
                }
                if self.code.is_some() {
                    return Err(AuthError::Configuration(
                        "refresh_token grant must not carry a code".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Form-encoded body parameters for the token endpoint.
    pub fn to_form_params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("grant_type".to_string(), self.grant_type.as_str().to_string());
        params.insert("client_id".to_string(), self.client_id.clone());
        params.insert("redirect_uri".to_string(), self.redirect_uri.clone());
        if let Some(ref code) = self.code {
            params.insert("code".to_string(), code.clone());
        }
        if let Some(ref refresh_token) = self.refresh_token {
            params.insert("refresh_token".to_string(), refresh_token.clone());
        }
        for (key, value) in &self.extras {
            params.insert(key.clone(), value.clone());
        }
        params
    }
}

/// Wire shape of a token endpoint success body
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponseJson {
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// A token endpoint response
///
/// `issued_at` is stamped when the response is captured, not read from the
/// wire; combined with `expires_in` it yields the absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub scope: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl TokenResponse {
    /// Absolute expiry computed from `issued_at` + `expires_in`.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| self.issued_at + Duration::seconds(secs))
    }
}

/// A token revocation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevokeTokenRequest {
    pub token: String,
    pub client_id: Option<String>,
}

impl RevokeTokenRequest {
    pub fn validate(&self) -> AuthResult<()> {
        if self.token.is_empty() {
            return Err(AuthError::Configuration(
                "token must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Form-encoded body parameters for the revocation endpoint.
    pub fn to_form_params(&self) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("token".to_string(), self.token.clone());
        if let Some(ref client_id) = self.client_id {
            params.insert("client_id".to_string(), client_id.clone());
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_request() -> TokenRequest {
        TokenRequest {
            client_id: "c1".to_string(),
            redirect_uri: "http://127.0.0.1:32111/callback".to_string(),
            grant_type: GrantType::AuthorizationCode,
            code: Some("abc123".to_string()),
            refresh_token: None,
            extras: HashMap::from([("code_verifier".to_string(), "v".to_string())]),
        }
    }

    #[test]
    fn test_code_grant_validation() {
        assert!(code_request().validate().is_ok());

        let missing_code = TokenRequest {
            code: None,
            ..code_request()
        };
        assert!(matches!(
            missing_code.validate().unwrap_err(),
            AuthError::Configuration(_)
        ));

        let both_set = TokenRequest {
            refresh_token: Some("r".to_string()),
            ..code_request()
        };
        assert!(matches!(
            both_set.validate().unwrap_err(),
            AuthError::Configuration(_)
        ));
    }

    #[test]
    fn test_refresh_grant_validation() {
        let refresh = TokenRequest {
            grant_type: GrantType::RefreshToken,
            code: None,
            refresh_token: Some("r1".to_string()),
            extras: HashMap::new(),
            ..code_request()
        };
        assert!(refresh.validate().is_ok());

        let missing = TokenRequest {
            refresh_token: None,
            ..refresh
        };
        assert!(matches!(
            missing.validate().unwrap_err(),
            AuthError::Configuration(_)
        ));
    }

    #[test]
    fn test_form_params_carry_verifier() {
        let params = code_request().to_form_params();
        assert_eq!(params["grant_type"], "authorization_code");
        assert_eq!(params["code"], "abc123");
        assert_eq!(params["code_verifier"], "v");
        assert!(!params.contains_key("refresh_token"));
    }

    #[test]
    fn test_expires_at() {
        let issued_at = Utc::now();
        let response = TokenResponse {
            access_token: "tok".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: Some(3600),
            refresh_token: None,
            id_token: None,
            scope: None,
            issued_at,
        };
        assert_eq!(
            response.expires_at().unwrap(),
            issued_at + Duration::seconds(3600)
        );

        let no_expiry = TokenResponse {
            expires_in: None,
            ..response
        };
        assert!(no_expiry.expires_at().is_none());
    }

    #[test]
    fn test_revoke_validation_and_params() {
        let revoke = RevokeTokenRequest {
            token: "r1".to_string(),
            client_id: Some("c1".to_string()),
        };
        assert!(revoke.validate().is_ok());
        let params = revoke.to_form_params();
        assert_eq!(params["token"], "r1");
        assert_eq!(params["client_id"], "c1");

        let empty = RevokeTokenRequest {
            token: String::new(),
            client_id: None,
        };
        assert!(matches!(
            empty.validate().unwrap_err(),
            AuthError::Configuration(_)
        ));
    }

    #[test]
    fn test_wire_parse_minimal_body() {
        let json = r#"{"access_token": "tok"}"#;
        let parsed: TokenResponseJson = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.access_token.as_deref(), Some("tok"));
        assert!(parsed.token_type.is_none());
        assert!(parsed.expires_in.is_none());
    }
}
