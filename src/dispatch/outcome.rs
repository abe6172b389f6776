use std::time::Duration;

use tracing::Level;
use tracing::event;

use crate::request::Method;

/// Summary of one logical call, logged once it settles.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub method: Method,
    pub endpoint: String,
    pub attempts: u8,
    pub success: bool,
    pub status: Option<u16>,
    pub elapsed: Duration,
}

impl DispatchOutcome {
    pub fn log(&self) {
        event!(
            Level::INFO,
            method = %self.method,
            endpoint = %self.endpoint,
            attempts = self.attempts,
            success = self.success,
            status = ?self.status,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "dispatch.outcome"
        );
    }
}
