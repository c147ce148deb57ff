//! Authorization outcome delivery
//!
//! One authorization cycle produces exactly one outcome. The notifier hands
//! out a one-shot receiver when a cycle is armed and resolves it from inside
//! the capture strategy; delivery with no armed cycle is dropped with a
//! warning rather than failing the flow.

use crate::request::{AuthorizationRequest, AuthorizationResponse};
use oxidc_types::AuthResult;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::warn;

/// The terminal outcome of one authorization cycle
///
/// `request` is the pending request the callback was matched against; it is
/// absent when the callback arrived with nothing pending.
#[derive(Debug)]
pub struct AuthorizationOutcome {
    pub request: Option<AuthorizationRequest>,
    pub result: AuthResult<AuthorizationResponse>,
}

/// Single-subscription, at-most-once outcome channel
#[derive(Default)]
pub struct AuthorizationNotifier {
    slot: Mutex<Option<oneshot::Sender<AuthorizationOutcome>>>,
}

impl AuthorizationNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a new cycle and return its receiving end.
    ///
    /// Replaces any previous subscription; an outstanding receiver from an
    /// earlier cycle resolves with a receive error.
    pub fn subscribe(&self) -> oneshot::Receiver<AuthorizationOutcome> {
        let (tx, rx) = oneshot::channel();
        if self.slot.lock().replace(tx).is_some() {
            warn!("Replacing an existing authorization subscription");
        }
        rx
    }

    /// Resolve the armed cycle with its outcome.
    ///
    /// Invoked exactly once per completed cycle by the capture strategy. A
    /// second delivery, or a delivery with no subscriber, is dropped.
    pub fn deliver(&self, outcome: AuthorizationOutcome) {
        match self.slot.lock().take() {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    warn!("Authorization outcome receiver was dropped before delivery");
                }
            }
            None => {
                warn!("Authorization outcome dropped: no subscriber registered");
            }
        }
    }

    /// Whether a cycle is currently armed.
    pub fn has_subscriber(&self) -> bool {
        self.slot.lock().is_some()
    }
}
