//! Authorization request and response value objects

use crate::crypto::{challenge_for, generate_pkce_pair, generate_state};
use crate::discovery::ServiceConfiguration;
use oxidc_types::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Key under which the PKCE verifier is kept in the request's internal map.
pub const INTERNAL_CODE_VERIFIER: &str = "code_verifier";

/// Unique identifier for an authorization request
///
/// The pending-request store is keyed by this id rather than by the state
/// token, so caller-supplied extras can never collide with the storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new unique request ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// OAuth2 response type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Authorization code flow
    Code,
    /// Implicit flow
    Token,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Code => "code",
            ResponseType::Token => "token",
        }
    }
}

/// Inputs for constructing an [`AuthorizationRequest`]
#[derive(Debug, Clone)]
pub struct AuthorizationRequestParams {
    /// OAuth client ID (required)
    pub client_id: String,

    /// Redirect URI the callback will arrive on (required)
    pub redirect_uri: String,

    /// Requested scope, space separated (may be empty)
    pub scope: String,

    /// Response type; `Code` enables PKCE by default
    pub response_type: ResponseType,

    /// Anti-CSRF state token; generated when `None` or empty
    pub state: Option<String>,

    /// Additional authorization query parameters
    pub extras: HashMap<String, String>,

    /// Opt out of PKCE for the code flow
    pub disable_pkce: bool,
}

impl Default for AuthorizationRequestParams {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: String::new(),
            scope: String::new(),
            response_type: ResponseType::Code,
            state: None,
            extras: HashMap::new(),
            disable_pkce: false,
        }
    }
}

/// An immutable authorization request
///
/// The serialized form keeps `internal` alongside the public fields so the
/// pending-request store can fully reconstruct the request after the redirect
/// round trip: the PKCE verifier must survive the boundary even though it is
/// never sent to the authorization endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Storage key for the pending-request store
    pub id: RequestId,

    /// OAuth client ID
    pub client_id: String,

    /// Redirect URI
    pub redirect_uri: String,

    /// Requested scope
    #[serde(default)]
    pub scope: String,

    /// Response type
    pub response_type: ResponseType,

    /// Anti-CSRF state token, always non-empty
    pub state: String,

    /// Additional authorization query parameters
    #[serde(default)]
    pub extras: HashMap<String, String>,

    /// Client-side-only values (PKCE `code_verifier`), never transmitted as
    /// top-level request fields
    #[serde(default)]
    pub internal: HashMap<String, String>,
}

impl AuthorizationRequest {
    /// Construct a request, validating required fields.
    ///
    /// Generates a state token when none is supplied, and a PKCE pair when
    /// the response type is `Code` and PKCE is not explicitly disabled. The
    /// verifier goes into `internal`; the challenge is derived from it again
    /// when the authorization URL is built.
    pub fn new(params: AuthorizationRequestParams) -> AuthResult<Self> {
        if params.client_id.is_empty() {
            return Err(AuthError::Configuration(
                "client_id must not be empty".to_string(),
            ));
        }
        if params.redirect_uri.is_empty() {
            return Err(AuthError::Configuration(
                "redirect_uri must not be empty".to_string(),
            ));
        }

        let state = params
            .state
            .filter(|s| !s.is_empty())
            .unwrap_or_else(generate_state);

        let mut internal = HashMap::new();
        if params.response_type == ResponseType::Code && !params.disable_pkce {
            let pkce = generate_pkce_pair();
            internal.insert(INTERNAL_CODE_VERIFIER.to_string(), pkce.verifier);
        }

        Ok(Self {
            id: RequestId::new(),
            client_id: params.client_id,
            redirect_uri: params.redirect_uri,
            scope: params.scope,
            response_type: params.response_type,
            state,
            extras: params.extras,
            internal,
        })
    }

    /// The PKCE code verifier, if this request is PKCE protected.
    pub fn code_verifier(&self) -> Option<&str> {
        self.internal.get(INTERNAL_CODE_VERIFIER).map(String::as_str)
    }

    /// Build the authorization endpoint URL for this request.
    ///
    /// Standard parameters first, then `code_challenge`/`code_challenge_method`
    /// when PKCE is active, then caller-supplied extras. The verifier itself
    /// never appears in the URL.
    pub fn authorization_url(&self, configuration: &ServiceConfiguration) -> String {
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type={}&state={}",
            configuration.authorization_endpoint,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            self.response_type.as_str(),
            urlencoding::encode(&self.state),
        );

        if !self.scope.is_empty() {
            url.push_str(&format!("&scope={}", urlencoding::encode(&self.scope)));
        }

        if let Some(verifier) = self.code_verifier() {
            let challenge = challenge_for(verifier);
            url.push_str(&format!(
                "&code_challenge={}&code_challenge_method=S256",
                urlencoding::encode(&challenge)
            ));
        }

        for (key, value) in &self.extras {
            url.push_str(&format!(
                "&{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            ));
        }

        url
    }
}

/// Successful authorization callback, paired 1:1 with its request by `state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    /// Authorization code to exchange at the token endpoint
    pub code: String,

    /// Echoed state token
    pub state: String,
}
