//! Full-page redirect capture
//!
//! The browser navigates away to the authorization server and comes back on a
//! deep link or custom scheme. The process may not survive the round trip, so
//! the pending request lives in the injected store (file-backed in practice)
//! and completion is driven externally: whoever receives the callback URL
//! feeds it to [`RedirectCapture::complete_if_possible`].

use super::{resolve_callback, CallbackParams, CaptureState, CaptureStrategy};
use crate::discovery::ServiceConfiguration;
use crate::notifier::AuthorizationNotifier;
use crate::request::AuthorizationRequest;
use crate::store::PendingRequestStore;
use async_trait::async_trait;
use oxidc_types::{AuthError, AuthResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Where callback parameters are carried on the redirect URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackSource {
    /// `?code=...&state=...` (authorization code flow)
    #[default]
    Query,
    /// `#access_token=...&state=...` (implicit flow)
    Fragment,
}

pub struct RedirectCapture {
    store: Arc<dyn PendingRequestStore>,
    notifier: Arc<AuthorizationNotifier>,
    source: CallbackSource,
    state: Mutex<CaptureState>,
}

impl RedirectCapture {
    pub fn new(
        store: Arc<dyn PendingRequestStore>,
        notifier: Arc<AuthorizationNotifier>,
    ) -> Self {
        Self::with_source(store, notifier, CallbackSource::default())
    }

    pub fn with_source(
        store: Arc<dyn PendingRequestStore>,
        notifier: Arc<AuthorizationNotifier>,
        source: CallbackSource,
    ) -> Self {
        Self {
            store,
            notifier,
            source,
            state: Mutex::new(CaptureState::Idle),
        }
    }

    /// Pull callback parameters out of a redirect URL.
    ///
    /// Returns `None` when the URL carries none of `code`, `state` or `error`
    /// in the configured part, so unrelated deep links pass through untouched.
    fn extract_params(&self, callback_url: &str) -> AuthResult<Option<CallbackParams>> {
        let url = reqwest::Url::parse(callback_url).map_err(|e| {
            AuthError::Protocol(format!("unparseable callback URL {}: {}", callback_url, e))
        })?;

        let mut params = CallbackParams::default();
        let mut assign = |key: &str, value: String| match key {
            "code" => params.code = Some(value),
            "state" => params.state = Some(value),
            "error" => params.error = Some(value),
            "error_description" => params.error_description = Some(value),
            _ => {}
        };

        match self.source {
            CallbackSource::Query => {
                for (key, value) in url.query_pairs() {
                    assign(&key, value.into_owned());
                }
            }
            CallbackSource::Fragment => {
                for pair in url.fragment().unwrap_or_default().split('&') {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    let value = urlencoding::decode(value)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| value.to_string());
                    assign(key, value);
                }
            }
        }

        Ok(params.is_callback().then_some(params))
    }
}

#[async_trait]
impl CaptureStrategy for RedirectCapture {
    async fn begin(
        &self,
        configuration: &ServiceConfiguration,
        request: AuthorizationRequest,
    ) -> AuthResult<String> {
        {
            let mut state = self.state.lock();
            if *state == CaptureState::AwaitingCallback {
                return Err(AuthError::AlreadyInProgress);
            }
            *state = CaptureState::AwaitingCallback;
        }

        let url = request.authorization_url(configuration);
        if let Err(e) = self.store.put(&request) {
            *self.state.lock() = CaptureState::Idle;
            return Err(e);
        }

        info!("Persisted authorization request {}; awaiting redirect", request.id);
        Ok(url)
    }

    async fn complete_if_possible(&self, callback_url: &str) -> AuthResult<bool> {
        let Some(params) = self.extract_params(callback_url)? else {
            debug!("URL carries no authorization callback parameters; ignoring");
            return Ok(false);
        };

        // A fresh process starts Idle but can still complete from the store.
        *self.state.lock() = CaptureState::Idle;
        resolve_callback(self.store.as_ref(), &self.notifier, params);
        Ok(true)
    }

    async fn cancel(&self) -> AuthResult<()> {
        *self.state.lock() = CaptureState::Idle;
        match self.store.take() {
            Ok(request) => {
                info!("Cancelled pending authorization request {}", request.id);
                Ok(())
            }
            Err(AuthError::NoPendingRequest) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::AuthorizationRequestParams;
    use crate::store::{FilePendingStore, MemoryPendingStore};

    fn test_configuration() -> ServiceConfiguration {
        ServiceConfiguration {
            authorization_endpoint: "https://idp.example/authorize".to_string(),
            token_endpoint: "https://idp.example/token".to_string(),
            revocation_endpoint: None,
        }
    }

    fn test_request() -> AuthorizationRequest {
        AuthorizationRequest::new(AuthorizationRequestParams {
            client_id: "c1".to_string(),
            redirect_uri: "myapp://callback".to_string(),
            scope: "openid".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_begin_returns_authorization_url_and_persists() {
        let store = Arc::new(MemoryPendingStore::new());
        let capture = RedirectCapture::new(store.clone(), Arc::new(AuthorizationNotifier::new()));

        let url = capture
            .begin(&test_configuration(), test_request())
            .await
            .unwrap();
        assert!(url.starts_with("https://idp.example/authorize?"));
        assert!(store.take().is_ok());
    }

    #[tokio::test]
    async fn test_double_begin_rejected() {
        let capture = RedirectCapture::new(
            Arc::new(MemoryPendingStore::new()),
            Arc::new(AuthorizationNotifier::new()),
        );

        capture
            .begin(&test_configuration(), test_request())
            .await
            .unwrap();
        let err = capture
            .begin(&test_configuration(), test_request())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AlreadyInProgress));
    }

    #[tokio::test]
    async fn test_complete_from_query_callback() {
        let capture = RedirectCapture::new(
            Arc::new(MemoryPendingStore::new()),
            Arc::new(AuthorizationNotifier::new()),
        );
        let rx = capture.notifier.subscribe();

        let request = test_request();
        let state = request.state.clone();
        capture
            .begin(&test_configuration(), request)
            .await
            .unwrap();

        let handled = capture
            .complete_if_possible(&format!("myapp://callback?code=abc123&state={}", state))
            .await
            .unwrap();
        assert!(handled);

        let outcome = rx.await.unwrap();
        let response = outcome.result.unwrap();
        assert_eq!(response.code, "abc123");
        assert_eq!(response.state, state);

        // Back to Idle: a new cycle may begin
        capture
            .begin(&test_configuration(), test_request())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unrelated_url_ignored() {
        let capture = RedirectCapture::new(
            Arc::new(MemoryPendingStore::new()),
            Arc::new(AuthorizationNotifier::new()),
        );
        capture
            .begin(&test_configuration(), test_request())
            .await
            .unwrap();

        let handled = capture
            .complete_if_possible("myapp://open?document=readme")
            .await
            .unwrap();
        assert!(!handled);
        // Pending request untouched
        assert!(capture.store.take().is_ok());
    }

    #[tokio::test]
    async fn test_unparseable_url_rejected() {
        let capture = RedirectCapture::new(
            Arc::new(MemoryPendingStore::new()),
            Arc::new(AuthorizationNotifier::new()),
        );
        let err = capture
            .complete_if_possible("not a url at all")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_fragment_callback() {
        let capture = RedirectCapture::with_source(
            Arc::new(MemoryPendingStore::new()),
            Arc::new(AuthorizationNotifier::new()),
            CallbackSource::Fragment,
        );
        let rx = capture.notifier.subscribe();

        let request = test_request();
        let state = request.state.clone();
        capture
            .begin(&test_configuration(), request)
            .await
            .unwrap();

        let handled = capture
            .complete_if_possible(&format!("myapp://callback#code=abc123&state={}", state))
            .await
            .unwrap();
        assert!(handled);
        assert!(rx.await.unwrap().result.is_ok());
    }

    #[tokio::test]
    async fn test_completion_survives_process_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending_request.json");
        let notifier = Arc::new(AuthorizationNotifier::new());

        let state = {
            let capture = RedirectCapture::new(
                Arc::new(FilePendingStore::new(path.clone())),
                notifier.clone(),
            );
            let request = test_request();
            let state = request.state.clone();
            capture
                .begin(&test_configuration(), request)
                .await
                .unwrap();
            state
            // Capture dropped: simulates the process exiting mid-flow
        };

        let capture = RedirectCapture::new(Arc::new(FilePendingStore::new(path)), notifier);
        let rx = capture.notifier.subscribe();
        let handled = capture
            .complete_if_possible(&format!("myapp://callback?code=abc123&state={}", state))
            .await
            .unwrap();
        assert!(handled);
        assert_eq!(rx.await.unwrap().result.unwrap().code, "abc123");
    }

    #[tokio::test]
    async fn test_cancel_clears_pending_and_is_idempotent() {
        let capture = RedirectCapture::new(
            Arc::new(MemoryPendingStore::new()),
            Arc::new(AuthorizationNotifier::new()),
        );
        capture
            .begin(&test_configuration(), test_request())
            .await
            .unwrap();

        capture.cancel().await.unwrap();
        capture.cancel().await.unwrap();
        assert!(matches!(
            capture.store.take().unwrap_err(),
            AuthError::NoPendingRequest
        ));

        // Cancel frees the slot for a fresh cycle
        capture
            .begin(&test_configuration(), test_request())
            .await
            .unwrap();
    }
}
