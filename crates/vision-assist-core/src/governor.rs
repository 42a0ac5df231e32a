//! Per-connection frame admission.
//!
//! A frame is admitted when at least `min_interval` has passed since the last
//! admitted frame on the same connection, measured on the server's monotonic
//! clock. Client timestamps are never consulted. Rejected frames leave the
//! connection untouched and produce no response.

use crate::config::PipelineConfig;
use crate::registry::Connection;
use std::time::Duration;
use tokio::time::Instant;

/// Admission policy shared by all connections; the state it reads and writes
/// lives on each [`Connection`].
#[derive(Debug, Clone, Copy)]
pub struct RateGovernor {
    min_interval: Duration,
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(PipelineConfig::DEFAULT_MIN_FRAME_INTERVAL)
    }
}

impl RateGovernor {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    /// Decide whether a frame arriving at `now` may be processed.
    ///
    /// On admission `last_admitted_at` moves to `now` within the same call.
    /// Taking `&mut Connection` means one connection can never evaluate two
    /// frames at once.
    pub fn admit(&self, connection: &mut Connection, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(connection.last_admitted_at());
        if elapsed < self.min_interval {
            return false;
        }
        connection.mark_admitted(now);
        true
    }
}
