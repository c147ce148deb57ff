//! OAuth2 / OpenID Connect authorization-code client engine
//!
//! Drives the authorization code flow with PKCE from the native side of the
//! redirect: builds the authorization request, captures the callback through
//! either a full-page redirect or a transient loopback listener, matches it
//! against the pending request, and exchanges the code for tokens.
//!
//! The moving parts are wired together explicitly rather than through
//! globals: a [`store::PendingRequestStore`] holds the single in-flight
//! request, an [`notifier::AuthorizationNotifier`] delivers the one outcome
//! per cycle, and all network traffic goes through an injected
//! [`requestor::HttpRequestor`]. [`session::FlowManager`] composes them into
//! pollable end-to-end sessions.

pub mod capture;
pub mod crypto;
pub mod discovery;
pub mod notifier;
pub mod request;
pub mod requestor;
pub mod session;
pub mod store;
pub mod token;
pub mod token_handler;

pub use capture::loopback::{LoopbackCapture, DEFAULT_CALLBACK_PATH, DEFAULT_LOOPBACK_PORT};
pub use capture::redirect::{CallbackSource, RedirectCapture};
pub use capture::CaptureStrategy;
pub use crypto::{challenge_for, generate_pkce_pair, generate_state, PkcePair};
pub use discovery::ServiceConfiguration;
pub use notifier::{AuthorizationNotifier, AuthorizationOutcome};
pub use request::{
    AuthorizationRequest, AuthorizationRequestParams, AuthorizationResponse, RequestId,
    ResponseType,
};
pub use requestor::{HttpRequestor, HttpResponse, ReqwestRequestor};
pub use session::{FlowManager, FlowStart, FlowStatus, SessionId, FLOW_TIMEOUT_SECS};
pub use store::{FilePendingStore, MemoryPendingStore, PendingRequestStore};
pub use token::{GrantType, RevokeTokenRequest, TokenRequest, TokenResponse};
pub use token_handler::{BaseTokenRequestHandler, TokenRequestHandler};

pub use oxidc_types::{AuthError, AuthResult};
