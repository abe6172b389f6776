use std::time::Duration;

use tokio::time::Instant;

use crate::errors::Error;

pub const DEFAULT_THRESHOLD: u32 = 5;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Counts refresh attempts inside a sliding start window and trips when a
/// server keeps rejecting freshly issued tokens.
#[derive(Debug)]
pub struct LoopDetector {
    threshold: u32,
    window: Duration,
    count: u32,
    window_start: Option<Instant>,
}

impl LoopDetector {
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            count: 0,
            window_start: None,
        }
    }

    /// Records one refresh attempt at `now`.
    ///
    /// Returns [`Error::RefreshLoop`] on the attempt that reaches the
    /// threshold inside the window; the counter resets afterwards.
    pub fn record(&mut self, now: Instant) -> Result<(), Error> {
        let expired = match self.window_start {
            Some(start) => now.saturating_duration_since(start) > self.window,
            None => true,
        };
        if expired {
            self.count = 0;
            self.window_start = Some(now);
        }
        self.count += 1;
        if self.count >= self.threshold {
            let attempts = self.count;
            self.count = 0;
            self.window_start = None;
            return Err(Error::RefreshLoop {
                attempts,
                window: self.window,
            });
        }
        Ok(())
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_WINDOW)
    }
}
