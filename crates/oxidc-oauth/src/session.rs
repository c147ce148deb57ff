//! Flow session management
//!
//! A session tracks one authorization cycle end to end: it arms the notifier,
//! kicks off the capture strategy, waits for the outcome under a timeout, and
//! runs the code-for-token exchange automatically. Callers hold a
//! [`SessionId`] and poll [`FlowManager::poll_status`] until a terminal
//! status appears.

use crate::capture::CaptureStrategy;
use crate::discovery::ServiceConfiguration;
use crate::notifier::AuthorizationNotifier;
use crate::request::{AuthorizationRequest, AuthorizationRequestParams};
use crate::token::{GrantType, TokenRequest, TokenResponse};
use crate::token_handler::TokenRequestHandler;
use chrono::{DateTime, Utc};
use oxidc_types::AuthResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a flow may sit awaiting its callback before it times out.
pub const FLOW_TIMEOUT_SECS: u64 = 300;

/// Terminal sessions older than this are dropped by cleanup.
const SESSION_RETENTION_SECS: i64 = 3600;

/// Identifier for one authorization flow session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable state of a flow session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlowStatus {
    /// Awaiting the authorization callback
    Pending,
    /// Callback received; exchanging the code for tokens
    ExchangingToken,
    Success {
        tokens: TokenResponse,
    },
    Error {
        message: String,
    },
    /// No callback arrived within the flow timeout
    Timeout,
    Cancelled,
}

impl FlowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FlowStatus::Pending | FlowStatus::ExchangingToken)
    }
}

/// What the caller needs to drive the user agent
#[derive(Debug, Clone)]
pub struct FlowStart {
    pub session_id: SessionId,
    pub auth_url: String,
    pub state: String,
}

struct FlowSession {
    status: FlowStatus,
    created_at: DateTime<Utc>,
    capture: Arc<dyn CaptureStrategy>,
}

type SessionMap = Arc<RwLock<HashMap<SessionId, FlowSession>>>;

/// Overwrite a session's status unless it already reached a terminal state.
/// A late callback must not resurrect a cancelled or timed-out flow.
fn set_status_if_active(sessions: &SessionMap, session_id: SessionId, status: FlowStatus) {
    let mut sessions = sessions.write();
    if let Some(session) = sessions.get_mut(&session_id) {
        if session.status.is_terminal() {
            debug!(
                "Ignoring status update for terminal session {}",
                session_id
            );
        } else {
            session.status = status;
        }
    }
}

pub struct FlowManager {
    sessions: SessionMap,
    token_handler: Arc<dyn TokenRequestHandler>,
    timeout: Duration,
}

impl FlowManager {
    pub fn new(token_handler: Arc<dyn TokenRequestHandler>) -> Self {
        Self::with_timeout(token_handler, Duration::from_secs(FLOW_TIMEOUT_SECS))
    }

    pub fn with_timeout(token_handler: Arc<dyn TokenRequestHandler>, timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            token_handler,
            timeout,
        }
    }

    /// Start an authorization flow.
    ///
    /// Builds the request, arms the notifier, begins capture and spawns the
    /// driver task that waits for the outcome and performs the token
    /// exchange. The capture and notifier must be the pair wired together at
    /// construction.
    pub async fn start_flow(
        &self,
        configuration: ServiceConfiguration,
        params: AuthorizationRequestParams,
        capture: Arc<dyn CaptureStrategy>,
        notifier: Arc<AuthorizationNotifier>,
    ) -> AuthResult<FlowStart> {
        let request = AuthorizationRequest::new(params)?;
        let state = request.state.clone();

        // Subscribe before begin so no callback window is unobserved
        let rx = notifier.subscribe();
        let auth_url = capture.begin(&configuration, request).await?;

        let session_id = SessionId::new();
        self.sessions.write().insert(
            session_id,
            FlowSession {
                status: FlowStatus::Pending,
                created_at: Utc::now(),
                capture: capture.clone(),
            },
        );
        info!("Started authorization flow session {}", session_id);

        let sessions = self.sessions.clone();
        let token_handler = self.token_handler.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            drive_flow(
                sessions,
                token_handler,
                session_id,
                configuration,
                capture,
                rx,
                timeout,
            )
            .await;
        });

        Ok(FlowStart {
            session_id,
            auth_url,
            state,
        })
    }

    /// Current status of a session, or `None` for an unknown id.
    pub fn poll_status(&self, session_id: SessionId) -> Option<FlowStatus> {
        self.sessions.read().get(&session_id).map(|s| s.status.clone())
    }

    /// Cancel an active session: mark it `Cancelled` and tear down its
    /// capture. Cancelling a terminal or unknown session is a no-op.
    pub async fn cancel(&self, session_id: SessionId) -> AuthResult<()> {
        let capture = {
            let mut sessions = self.sessions.write();
            match sessions.get_mut(&session_id) {
                Some(session) if !session.status.is_terminal() => {
                    session.status = FlowStatus::Cancelled;
                    Some(session.capture.clone())
                }
                _ => None,
            }
        };

        if let Some(capture) = capture {
            info!("Cancelled authorization flow session {}", session_id);
            capture.cancel().await?;
        }
        Ok(())
    }

    /// Drop terminal sessions older than the retention window.
    pub fn cleanup_flows(&self) {
        let cutoff = Utc::now() - chrono::Duration::seconds(SESSION_RETENTION_SECS);
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| !(s.status.is_terminal() && s.created_at < cutoff));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("Cleaned up {} finished flow sessions", removed);
        }
    }

    /// Number of sessions still awaiting an outcome.
    pub fn active_flow_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|s| !s.status.is_terminal())
            .count()
    }
}

async fn drive_flow(
    sessions: SessionMap,
    token_handler: Arc<dyn TokenRequestHandler>,
    session_id: SessionId,
    configuration: ServiceConfiguration,
    capture: Arc<dyn CaptureStrategy>,
    rx: tokio::sync::oneshot::Receiver<crate::notifier::AuthorizationOutcome>,
    timeout: Duration,
) {
    let outcome = match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => {
            // Sender dropped without delivering, e.g. a replaced subscription
            set_status_if_active(
                &sessions,
                session_id,
                FlowStatus::Error {
                    message: "authorization channel closed before an outcome arrived".to_string(),
                },
            );
            return;
        }
        Err(_) => {
            warn!("Authorization flow session {} timed out", session_id);
            if let Err(e) = capture.cancel().await {
                warn!("Failed to tear down capture after timeout: {}", e);
            }
            set_status_if_active(&sessions, session_id, FlowStatus::Timeout);
            return;
        }
    };

    let (request, response) = match (outcome.request, outcome.result) {
        (Some(request), Ok(response)) => (request, response),
        (_, Err(e)) => {
            set_status_if_active(
                &sessions,
                session_id,
                FlowStatus::Error {
                    message: e.to_string(),
                },
            );
            return;
        }
        (None, Ok(_)) => {
            set_status_if_active(
                &sessions,
                session_id,
                FlowStatus::Error {
                    message: "authorization outcome carried no originating request".to_string(),
                },
            );
            return;
        }
    };

    set_status_if_active(&sessions, session_id, FlowStatus::ExchangingToken);

    let status = match exchange_code(&*token_handler, &configuration, &request, response.code).await
    {
        Ok(tokens) => FlowStatus::Success { tokens },
        Err(e) => FlowStatus::Error {
            message: e.to_string(),
        },
    };
    set_status_if_active(&sessions, session_id, status);
}

async fn exchange_code(
    token_handler: &dyn TokenRequestHandler,
    configuration: &ServiceConfiguration,
    request: &AuthorizationRequest,
    code: String,
) -> AuthResult<TokenResponse> {
    let mut extras = HashMap::new();
    if let Some(verifier) = request.code_verifier() {
        extras.insert("code_verifier".to_string(), verifier.to_string());
    }

    let token_request = TokenRequest {
        client_id: request.client_id.clone(),
        redirect_uri: request.redirect_uri.clone(),
        grant_type: GrantType::AuthorizationCode,
        code: Some(code),
        refresh_token: None,
        extras,
    };

    token_handler
        .perform_token_request(configuration, &token_request)
        .await
}
