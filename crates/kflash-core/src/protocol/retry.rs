//! Retry and timeout policy
//!
//! The session consults this module on every exchange: how long to wait for a
//! frame, how long to pause before resending, and how many attempts a phase
//! gets before the session gives up.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::SessionPhase;

/// Retry ceiling shared by the stub handshakes (flash greeting, flash init)
pub const MAX_RETRY_TIMES: u32 = 10;

/// Number of ISP greetings (each preceded by a reset into ISP mode) before giving up
pub const GREETING_ATTEMPTS: u32 = 15;

/// Time allowed for one complete response frame to arrive
pub const DEFAULT_FRAME_TIMEOUT_MS: u64 = 10_000;

/// Pause before resending a handshake
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

/// Pause between control line steps
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 100;

/// Pause after MEMORY_BOOT while the stub starts up
pub const DEFAULT_BOOT_DELAY_MS: u64 = 100;

/// Pause between UARTHS_BAUDRATE_SET and reopening the port
pub const DEFAULT_BAUD_SWITCH_DELAY_MS: u64 = 50;

/// Timing and retry configuration for a flashing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts allowed for the ISP greeting
    pub greeting_attempts: u32,
    /// Attempts allowed for the flash greeting and flash init
    pub handshake_attempts: u32,
    /// Attempts allowed per upload chunk, `None` resends until acknowledged
    pub chunk_attempts: Option<u32>,
    /// Deadline in milliseconds for a whole response frame, not per byte
    pub frame_timeout_ms: u64,
    pub retry_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub boot_delay_ms: u64,
    pub baud_switch_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            greeting_attempts: GREETING_ATTEMPTS,
            handshake_attempts: MAX_RETRY_TIMES + 1,
            chunk_attempts: None,
            frame_timeout_ms: DEFAULT_FRAME_TIMEOUT_MS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            boot_delay_ms: DEFAULT_BOOT_DELAY_MS,
            baud_switch_delay_ms: DEFAULT_BAUD_SWITCH_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn boot_delay(&self) -> Duration {
        Duration::from_millis(self.boot_delay_ms)
    }

    pub fn baud_switch_delay(&self) -> Duration {
        Duration::from_millis(self.baud_switch_delay_ms)
    }

    /// Maximum number of attempts for a phase, `None` meaning unbounded
    pub fn attempt_limit(&self, phase: &SessionPhase) -> Option<u32> {
        match phase {
            SessionPhase::Greeting => Some(self.greeting_attempts),
            SessionPhase::FlashGreeting | SessionPhase::FlashInit => {
                Some(self.handshake_attempts)
            }
            SessionPhase::StubUpload { .. } | SessionPhase::FlashWrite { .. } => {
                self.chunk_attempts
            }
            _ => None,
        }
    }

    /// Pause before the next attempt of a phase
    ///
    /// The greeting already waits inside its reset sequence, and upload
    /// chunks are resent immediately.
    pub fn retry_delay(&self, phase: &SessionPhase) -> Duration {
        match phase {
            SessionPhase::FlashGreeting | SessionPhase::FlashInit => {
                Duration::from_millis(self.retry_delay_ms)
            }
            _ => Duration::ZERO,
        }
    }
}

/// Outcome of recording a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Try the same phase again
    Retry,
    /// The ceiling was reached after this many attempts
    Exhausted(u32),
}

/// Failed attempt counter for the phase currently running
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Attempts {
    failed: u32,
}

impl Attempts {
    /// Number of the attempt about to be made, starting at 1
    pub fn current(&self) -> u32 {
        self.failed + 1
    }

    /// Whether an earlier attempt of this phase already failed
    pub fn is_retry(&self) -> bool {
        self.failed > 0
    }

    /// Record a failure against an optional ceiling
    pub fn fail(&mut self, limit: Option<u32>) -> Escalation {
        self.failed += 1;
        match limit {
            Some(limit) if self.failed >= limit => Escalation::Exhausted(self.failed),
            _ => Escalation::Retry,
        }
    }

    pub fn reset(&mut self) {
        self.failed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.greeting_attempts, 15);
        assert_eq!(policy.handshake_attempts, MAX_RETRY_TIMES + 1);
        assert_eq!(policy.chunk_attempts, None);
        assert_eq!(policy.frame_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_attempt_limits_per_phase() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempt_limit(&SessionPhase::Greeting), Some(15));
        assert_eq!(policy.attempt_limit(&SessionPhase::FlashGreeting), Some(11));
        assert_eq!(policy.attempt_limit(&SessionPhase::FlashInit), Some(11));
        assert_eq!(
            policy.attempt_limit(&SessionPhase::FlashWrite { offset: 0 }),
            None
        );
        assert_eq!(policy.attempt_limit(&SessionPhase::Boot), None);
    }

    #[test]
    fn test_retry_delay_only_for_handshakes() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.retry_delay(&SessionPhase::FlashInit),
            Duration::from_millis(100)
        );
        assert_eq!(
            policy.retry_delay(&SessionPhase::StubUpload { offset: 1024 }),
            Duration::ZERO
        );
    }

    #[test]
    fn test_attempts_exhaust_exactly_at_limit() {
        let mut attempts = Attempts::default();
        assert_eq!(attempts.current(), 1);
        for _ in 0..10 {
            assert_eq!(attempts.fail(Some(11)), Escalation::Retry);
        }
        assert_eq!(attempts.current(), 11);
        assert_eq!(attempts.fail(Some(11)), Escalation::Exhausted(11));

        attempts.reset();
        assert!(!attempts.is_retry());
    }

    #[test]
    fn test_unbounded_attempts() {
        let mut attempts = Attempts::default();
        for _ in 0..1000 {
            assert_eq!(attempts.fail(None), Escalation::Retry);
        }
    }

    #[test]
    fn test_partial_policy_from_json() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{ "frame_timeout_ms": 500, "chunk_attempts": 3 }"#).unwrap();
        assert_eq!(policy.frame_timeout_ms, 500);
        assert_eq!(policy.chunk_attempts, Some(3));
        assert_eq!(policy.greeting_attempts, GREETING_ATTEMPTS);
    }
}
