//! Loopback HTTP capture
//!
//! Starts a transient HTTP listener on 127.0.0.1 and hands the authorization
//! server a loopback redirect URI. The listener serves exactly one callback:
//! the first request on the callback path resolves the flow, renders a small
//! result page and shuts the server down gracefully. Requests on any other
//! path get a 404 and leave the listener running.

use super::{resolve_callback, CallbackDisposition, CallbackParams, CaptureState, CaptureStrategy};
use crate::discovery::ServiceConfiguration;
use crate::notifier::AuthorizationNotifier;
use crate::request::AuthorizationRequest;
use crate::store::PendingRequestStore;
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use oxidc_types::{AuthError, AuthResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Default loopback port for the callback listener.
pub const DEFAULT_LOOPBACK_PORT: u16 = 32111;

/// Default path the redirect URI points at.
pub const DEFAULT_CALLBACK_PATH: &str = "/callback";

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 4em;">
<h1>Authorization complete</h1>
<p>You can close this window and return to the application.</p>
</body>
</html>"#;

fn failure_page(error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 4em;">
<h1>Authorization failed</h1>
<p>{}</p>
<p>You can close this window.</p>
</body>
</html>"#,
        error
    )
}

struct ListenerShared {
    store: Arc<dyn PendingRequestStore>,
    notifier: Arc<AuthorizationNotifier>,
    state: Mutex<CaptureState>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

pub struct LoopbackCapture {
    shared: Arc<ListenerShared>,
    port: u16,
    path: String,
    bound: Mutex<Option<SocketAddr>>,
}

impl LoopbackCapture {
    pub fn new(
        store: Arc<dyn PendingRequestStore>,
        notifier: Arc<AuthorizationNotifier>,
    ) -> Self {
        Self::with_address(store, notifier, DEFAULT_LOOPBACK_PORT, DEFAULT_CALLBACK_PATH)
    }

    /// Listener on a specific port and callback path. Port 0 binds an
    /// ephemeral port; see [`LoopbackCapture::bound_addr`].
    pub fn with_address(
        store: Arc<dyn PendingRequestStore>,
        notifier: Arc<AuthorizationNotifier>,
        port: u16,
        path: &str,
    ) -> Self {
        Self {
            shared: Arc::new(ListenerShared {
                store,
                notifier,
                state: Mutex::new(CaptureState::Idle),
                shutdown: Mutex::new(None),
            }),
            port,
            path: path.to_string(),
            bound: Mutex::new(None),
        }
    }

    /// Address the listener is bound to while a cycle is active.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock()
    }
}

async fn handle_callback(
    State(shared): State<Arc<ListenerShared>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    // Single use: the first callback takes the shutdown handle; anything
    // racing in behind it is refused.
    let Some(tx) = shared.shutdown.lock().take() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let params = CallbackParams {
        code: query.get("code").cloned(),
        state: query.get("state").cloned(),
        error: query.get("error").cloned(),
        error_description: query.get("error_description").cloned(),
    };

    let disposition = resolve_callback(shared.store.as_ref(), &shared.notifier, params);
    *shared.state.lock() = CaptureState::Idle;
    let _ = tx.send(());

    match disposition {
        CallbackDisposition::Success => Html(SUCCESS_PAGE.to_string()).into_response(),
        CallbackDisposition::Denied { error } => {
            Html(failure_page(&format!("The authorization server reported: {}", error)))
                .into_response()
        }
        CallbackDisposition::NoPending => (
            StatusCode::BAD_REQUEST,
            Html(failure_page("No authorization request was in progress.")),
        )
            .into_response(),
        CallbackDisposition::StateMismatch => (
            StatusCode::BAD_REQUEST,
            Html(failure_page("The response did not match the pending request.")),
        )
            .into_response(),
    }
}

#[async_trait]
impl CaptureStrategy for LoopbackCapture {
    async fn begin(
        &self,
        configuration: &ServiceConfiguration,
        request: AuthorizationRequest,
    ) -> AuthResult<String> {
        {
            let mut state = self.shared.state.lock();
            if *state == CaptureState::AwaitingCallback {
                return Err(AuthError::AlreadyInProgress);
            }
            *state = CaptureState::AwaitingCallback;
        }

        // Bind before persisting anything: a taken port fails the whole
        // begin and leaves no pending entry behind.
        let listener = match TcpListener::bind(("127.0.0.1", self.port)).await {
            Ok(listener) => listener,
            Err(e) => {
                *self.shared.state.lock() = CaptureState::Idle;
                return Err(AuthError::Configuration(format!(
                    "failed to bind loopback listener on port {}: {}",
                    self.port, e
                )));
            }
        };
        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                *self.shared.state.lock() = CaptureState::Idle;
                return Err(e.into());
            }
        };
        *self.bound.lock() = Some(addr);

        if let Err(e) = self.shared.store.put(&request) {
            *self.shared.state.lock() = CaptureState::Idle;
            return Err(e);
        }

        let (tx, rx) = oneshot::channel();
        *self.shared.shutdown.lock() = Some(tx);

        let app = Router::new()
            .route(&self.path, get(handle_callback))
            .with_state(self.shared.clone());

        let url = request.authorization_url(configuration);
        info!("Loopback callback listener on http://{}{}", addr, self.path);

        tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                rx.await.ok();
            });
            if let Err(e) = serve.await {
                warn!("Loopback callback listener error: {}", e);
            }
        });

        Ok(url)
    }

    /// The loopback listener drives its own completion; external URLs are
    /// never its business.
    async fn complete_if_possible(&self, _callback_url: &str) -> AuthResult<bool> {
        Ok(false)
    }

    async fn cancel(&self) -> AuthResult<()> {
        if let Some(tx) = self.shared.shutdown.lock().take() {
            info!("Shutting down loopback callback listener");
            let _ = tx.send(());
        }
        *self.shared.state.lock() = CaptureState::Idle;
        *self.bound.lock() = None;

        match self.shared.store.take() {
            Ok(_) | Err(AuthError::NoPendingRequest) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
