//! # Session Configuration
//!
//! Every knob the session engine reads, gathered into plain structs with
//! `Default` implementations tuned for a Substrate node on a public network.

use std::time::Duration;

use crate::error::SubscriberError;

/// Bounded timeouts enforced by the connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Upper bound for a single dial + handshake attempt.
    pub dial: Duration,
    /// Upper bound for waiting on the next inbound frame.
    pub read: Duration,
    /// Upper bound for flushing one outbound frame.
    pub write: Duration,
    /// Ping period and silence threshold for the keepalive watchdog.
    /// `None` disables the watchdog.
    pub keepalive: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            dial: Duration::from_secs(10),
            read: Duration::from_secs(10),
            write: Duration::from_secs(5),
            keepalive: Some(Duration::from_secs(5)),
        }
    }
}

/// Exponential backoff between dial attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failed attempt.
    pub base: Duration,
    /// Ceiling for the doubled delay.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Everything a [`crate::core::Session`] needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Node notification endpoint, e.g. `wss://rpc.example.org`.
    pub endpoint: String,
    /// Dial, read, write and keepalive bounds.
    pub timeouts: Timeouts,
    /// Retry pacing for the handle's background dialer.
    pub backoff: Backoff,
    /// Period of the advisory `system_health` request.
    pub heartbeat_interval: Duration,
    /// Pause after a reconnect before the read loop resumes.
    pub settle_pause: Duration,
    /// Sleep between liveness checks while waiting for a link.
    pub live_poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:9944".to_string(),
            timeouts: Timeouts::default(),
            backoff: Backoff::default(),
            heartbeat_interval: Duration::from_secs(3),
            settle_pause: Duration::from_secs(10),
            live_poll_interval: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    /// Rejects settings the engine cannot run with. Every period and timeout
    /// must be non-zero: a zero heartbeat period has no valid timer, and a
    /// zero poll or backoff turns a wait into a spin.
    pub fn validate(&self) -> Result<(), SubscriberError> {
        let periods = [
            ("heartbeat_interval", Some(self.heartbeat_interval)),
            ("live_poll_interval", Some(self.live_poll_interval)),
            ("backoff.base", Some(self.backoff.base)),
            ("timeouts.dial", Some(self.timeouts.dial)),
            ("timeouts.read", Some(self.timeouts.read)),
            ("timeouts.write", Some(self.timeouts.write)),
            ("timeouts.keepalive", self.timeouts.keepalive),
        ];
        for (field, period) in periods {
            if period.is_some_and(|p| p.is_zero()) {
                return Err(SubscriberError::InvalidConfig {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.backoff.max < self.backoff.base {
            return Err(SubscriberError::InvalidConfig {
                field: "backoff.max",
                reason: format!("{:?} is below the base delay {:?}", self.backoff.max, self.backoff.base),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let backoff = Backoff {
            base: Duration::from_millis(500),
            max: Duration::from_secs(4),
        };
        assert_eq!(backoff.delay_for(0), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(40), Duration::from_secs(4));
    }

    #[test]
    fn defaults_match_the_node_cadence() {
        let config = SessionConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(3));
        assert_eq!(config.settle_pause, Duration::from_secs(10));
        assert_eq!(config.live_poll_interval, Duration::from_secs(1));
        assert_eq!(config.timeouts.write, Duration::from_secs(5));
    }

    #[test]
    fn defaults_are_valid() {
        assert!(SessionConfig::default().validate().is_ok());
        let no_keepalive = SessionConfig {
            timeouts: Timeouts {
                keepalive: None,
                ..Timeouts::default()
            },
            ..SessionConfig::default()
        };
        assert!(no_keepalive.validate().is_ok());
    }

    #[test]
    fn zero_periods_are_rejected() {
        let rejected = |config: SessionConfig| match config.validate() {
            Err(SubscriberError::InvalidConfig { field, .. }) => field,
            other => panic!("expected InvalidConfig, got {other:?}"),
        };

        assert_eq!(
            rejected(SessionConfig {
                heartbeat_interval: Duration::ZERO,
                ..SessionConfig::default()
            }),
            "heartbeat_interval"
        );
        assert_eq!(
            rejected(SessionConfig {
                live_poll_interval: Duration::ZERO,
                ..SessionConfig::default()
            }),
            "live_poll_interval"
        );
        assert_eq!(
            rejected(SessionConfig {
                timeouts: Timeouts {
                    keepalive: Some(Duration::ZERO),
                    ..Timeouts::default()
                },
                ..SessionConfig::default()
            }),
            "timeouts.keepalive"
        );
        assert_eq!(
            rejected(SessionConfig {
                backoff: Backoff {
                    base: Duration::from_secs(5),
                    max: Duration::from_secs(1),
                },
                ..SessionConfig::default()
            }),
            "backoff.max"
        );
    }
}
