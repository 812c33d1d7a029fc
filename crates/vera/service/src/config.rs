use std::time::Duration;

/// Tunables for the governance service.
#[derive(Clone, Debug)]
pub struct GovernanceConfig {
    /// Violation count at which a binding auto-suspends. `None` disables
    /// auto-suspend entirely.
    pub auto_suspend_threshold: Option<u32>,
    /// Upper bound on a single ledger append.
    pub append_timeout: Duration,
    /// Upper bound on a signing round-trip, including the ledger entry the
    /// signed operation produces.
    pub signing_timeout: Duration,
    /// Cross-check verified bundles against the live ledger. Advisory;
    /// findings land in warnings, never in failure reasons.
    pub live_cross_check: bool,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            auto_suspend_threshold: None,
            append_timeout: Duration::from_secs(5),
            signing_timeout: Duration::from_secs(5),
            live_cross_check: false,
        }
    }
}

impl GovernanceConfig {
    pub fn with_auto_suspend_threshold(mut self, threshold: u32) -> Self {
        self.auto_suspend_threshold = Some(threshold);
        self
    }

    pub fn with_live_cross_check(mut self) -> Self {
        self.live_cross_check = true;
        self
    }
}
