//! Progress tracking for address scans.
//!
//! The host is told how far the current address scan has come. Per-address fractions are
//! reported on every pass, `1.0` only once, when the first full pass completes, so the host can
//! leave its loading state exactly once.

use tracing::info;

/// Service for tracking address scan progress
#[derive(Debug, Clone, Default)]
pub struct SyncProgressTracker {
    /// Addresses checked in the current pass
    checked: usize,
    /// Addresses requested in the current pass
    to_check: usize,
    /// Set once a full pass has completed
    initial_pass_complete: bool,
}

impl SyncProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a pass over `to_check` addresses.
    pub fn begin_pass(&mut self, to_check: usize) {
        self.checked = 0;
        self.to_check = to_check;
    }

    /// Record one checked address.
    ///
    /// Returns the fraction to report, if any. The final address of a pass never reports
    /// here; completion is signalled by [`finish_pass`](Self::finish_pass).
    pub fn record_checked(&mut self) -> Option<f64> {
        self.checked += 1;
        if self.to_check == 0 || self.checked >= self.to_check {
            return None;
        }
        Some(self.checked as f64 / self.to_check as f64)
    }

    /// Mark the current pass complete. Returns `true` only for the first completed pass.
    pub fn finish_pass(&mut self) -> bool {
        self.checked = 0;
        self.to_check = 0;
        if self.initial_pass_complete {
            return false;
        }
        self.initial_pass_complete = true;
        info!("Initial address scan complete");
        true
    }

    pub fn is_initial_pass_complete(&self) -> bool {
        self.initial_pass_complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_fractions_every_pass_and_completion_once() {
        let mut tracker = SyncProgressTracker::new();
        tracker.begin_pass(4);
        assert_eq!(tracker.record_checked(), Some(0.25));
        assert_eq!(tracker.record_checked(), Some(0.5));
        assert_eq!(tracker.record_checked(), Some(0.75));
        assert_eq!(tracker.record_checked(), None);
        assert!(tracker.finish_pass());
        assert!(tracker.is_initial_pass_complete());

        tracker.begin_pass(2);
        assert_eq!(tracker.record_checked(), Some(0.5));
        assert_eq!(tracker.record_checked(), None);
        assert!(!tracker.finish_pass());
        assert!(tracker.is_initial_pass_complete());
    }

    #[test]
    fn aborted_pass_does_not_complete() {
        let mut tracker = SyncProgressTracker::new();
        tracker.begin_pass(2);
        assert_eq!(tracker.record_checked(), Some(0.5));

        tracker.begin_pass(2);
        assert_eq!(tracker.record_checked(), Some(0.5));
        assert!(!tracker.is_initial_pass_complete());
    }
}
