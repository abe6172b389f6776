use tracing::{Level, event};
use uuid::Uuid;

use crate::errors::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Refresh token exchanged for a new token.
    Refreshed,
    /// Full re-login ran.
    Relogin,
}

/// Structured events for one refresh attempt, correlated by `attempt_id`.
#[derive(Clone, Debug)]
pub struct RefreshTelemetry {
    attempt_id: Uuid,
    context: String,
}

impl RefreshTelemetry {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            context: context.into(),
        }
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn emit_start(&self, status: Option<u16>) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            status = ?status,
            "refresh.start"
        );
    }

    pub fn emit_relogin(&self, reason: &str) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            reason,
            "relogin.start"
        );
    }

    pub fn emit_success(&self, outcome: RefreshOutcome) {
        event!(
            Level::INFO,
            attempt_id = %self.attempt_id,
            context = %self.context,
            outcome = ?outcome,
            "refresh.success"
        );
    }

    pub fn emit_failure(&self, error: &Error) {
        event!(
            Level::ERROR,
            attempt_id = %self.attempt_id,
            context = %self.context,
            error = %error,
            "refresh.failure"
        );
    }

    pub fn emit_loop_detected(&self, attempts: u32, window_ms: u64) {
        event!(
            Level::ERROR,
            attempt_id = %self.attempt_id,
            context = %self.context,
            attempts,
            window_ms,
            "refresh.loop_detected"
        );
    }
}

/// Another caller already replaced the token this request was sent with.
pub fn emit_skipped(context: &str) {
    event!(Level::DEBUG, context, "refresh.skipped");
}

/// A refresh is already in flight; this caller awaits its outcome.
pub fn emit_waiting(context: &str) {
    event!(Level::DEBUG, context, "refresh.waiting");
}
