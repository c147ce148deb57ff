//! User-agent capture strategies
//!
//! Two ways of getting the authorization callback back from the user agent:
//! a full-page browser redirect whose pending state is persisted across the
//! round trip ([`redirect::RedirectCapture`]), and a transient local HTTP
//! listener ([`loopback::LoopbackCapture`]). Both implement the same
//! capability set and share the callback-matching logic below.

pub mod loopback;
pub mod redirect;

use crate::discovery::ServiceConfiguration;
use crate::notifier::{AuthorizationNotifier, AuthorizationOutcome};
use crate::request::{AuthorizationRequest, AuthorizationResponse};
use crate::store::PendingRequestStore;
use async_trait::async_trait;
use oxidc_types::{AuthError, AuthResult};
use tracing::{info, warn};

/// Capture strategy state machine: `Idle` or `AwaitingCallback`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CaptureState {
    Idle,
    AwaitingCallback,
}

/// Polymorphic capture capability
#[async_trait]
pub trait CaptureStrategy: Send + Sync {
    /// Transition `Idle -> AwaitingCallback`: persist the request (redirect)
    /// or start listening (loopback) and return the authorization URL the
    /// user agent should navigate to. Fails with
    /// [`AuthError::AlreadyInProgress`] while a callback is awaited.
    async fn begin(
        &self,
        configuration: &ServiceConfiguration,
        request: AuthorizationRequest,
    ) -> AuthResult<String>;

    /// Attempt completion from a callback URL.
    ///
    /// The redirect variant parses the given URL once per call and returns
    /// whether callback parameters were found and processed. The loopback
    /// variant is driven by its own listener and always returns `Ok(false)`.
    async fn complete_if_possible(&self, callback_url: &str) -> AuthResult<bool>;

    /// Abort the cycle: remove the pending entry, release the listener if
    /// any, and transition back to `Idle`. Safe to call repeatedly.
    async fn cancel(&self) -> AuthResult<()>;
}

/// Raw parameters extracted from a callback
#[derive(Debug, Default, Clone)]
pub(crate) struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Whether this looks like an authorization callback at all.
    pub fn is_callback(&self) -> bool {
        self.code.is_some() || self.error.is_some() || self.state.is_some()
    }
}

/// How a callback was resolved, for the capture variant's own reporting
/// (HTTP response page, return value)
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallbackDisposition {
    /// Matched the pending request and delivered a response
    Success,
    /// Matched the pending request; the server denied authorization
    Denied { error: String },
    /// Nothing was pending; the callback was discarded
    NoPending,
    /// Anti-CSRF failure; the flow was aborted
    StateMismatch,
}

/// Match callback parameters against the pending request and deliver the
/// outcome.
///
/// The pending entry is taken (removed) before any validation, so the
/// callback can be processed at most once. State comparison happens before
/// the response is even constructed: on mismatch the flow fails closed and
/// nothing reaches the token exchange.
pub(crate) fn resolve_callback(
    store: &dyn PendingRequestStore,
    notifier: &AuthorizationNotifier,
    params: CallbackParams,
) -> CallbackDisposition {
    let request = match store.take() {
        Ok(request) => request,
        Err(AuthError::NoPendingRequest) => {
            warn!("Authorization callback arrived with no pending request; discarding");
            notifier.deliver(AuthorizationOutcome {
                request: None,
                result: Err(AuthError::NoPendingRequest),
            });
            return CallbackDisposition::NoPending;
        }
        Err(e) => {
            warn!("Failed to read pending request: {}", e);
            notifier.deliver(AuthorizationOutcome {
                request: None,
                result: Err(e),
            });
            return CallbackDisposition::NoPending;
        }
    };

    // Anti-CSRF check. Error callbacks may legitimately omit state; anything
    // else without a matching state fails closed.
    let state_ok = match params.state.as_deref() {
        Some(state) => state == request.state,
        None => params.error.is_some(),
    };
    if !state_ok {
        warn!(
            "State mismatch on authorization callback for request {}; aborting flow",
            request.id
        );
        notifier.deliver(AuthorizationOutcome {
            request: Some(request),
            result: Err(AuthError::StateMismatch),
        });
        return CallbackDisposition::StateMismatch;
    }

    if let Some(error) = params.error {
        info!("Authorization denied by server: {}", error);
        notifier.deliver(AuthorizationOutcome {
            request: Some(request),
            result: Err(AuthError::Authorization {
                error: error.clone(),
                description: params.error_description,
            }),
        });
        return CallbackDisposition::Denied { error };
    }

    match params.code {
        Some(code) => {
            info!("Authorization callback matched pending request");
            let state = request.state.clone();
            notifier.deliver(AuthorizationOutcome {
                request: Some(request),
                result: Ok(AuthorizationResponse { code, state }),
            });
            CallbackDisposition::Success
        }
        None => {
            // State matched but the callback carries neither code nor error
            notifier.deliver(AuthorizationOutcome {
                request: Some(request),
                result: Err(AuthError::Protocol(
                    "authorization callback carries neither code nor error".to_string(),
                )),
            });
            CallbackDisposition::Denied {
                error: "invalid_callback".to_string(),
            }
        }
    }
}
