//! Pure reconnection backoff state
//!
//! The interval starts at a base value and doubles on every attempt up to a
//! ceiling. The attempt budget is only bounded for the link; the broker
//! retries for as long as it is enabled.

use crate::clock::elapsed_ms;

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    pub base_interval_ms: u32,
    pub max_interval_ms: u32,
    /// Maximum number of reconnection attempts (None = unlimited)
    pub max_attempts: Option<u32>,
}

impl ReconnectConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.base_interval_ms == 0 {
            return Err("reconnect_interval_ms must be greater than 0".to_string());
        }
        if self.max_interval_ms < self.base_interval_ms {
            return Err(format!(
                "max_reconnect_interval_ms ({}) is below reconnect_interval_ms ({})",
                self.max_interval_ms, self.base_interval_ms
            ));
        }
        Ok(())
    }
}

/// Reconnection decision (pure)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectDecision {
    /// Interval not yet elapsed
    Wait,
    /// Attempt now; carries the attempt number
    Attempt(u32),
    /// Attempt budget spent
    Exhausted,
}

/// Per-connection backoff bookkeeping
#[derive(Debug, Clone)]
pub struct ReconnectState {
    config: ReconnectConfig,
    last_attempt: Option<u32>,
    current_interval: u32,
    attempt_count: u32,
}

impl ReconnectState {
    pub fn new(config: ReconnectConfig) -> Self {
        let current_interval = config.base_interval_ms;
        Self {
            config,
            last_attempt: None,
            current_interval,
            attempt_count: 0,
        }
    }

    /// Back to the base interval with a fresh budget; the next check attempts immediately
    pub fn reset(&mut self) {
        self.last_attempt = None;
        self.current_interval = self.config.base_interval_ms;
        self.attempt_count = 0;
    }

    /// Record a connection start that does not consume budget (explicit enable)
    pub fn mark_started(&mut self, now: u32) {
        self.last_attempt = Some(now);
    }

    /// Decide whether to attempt at `now`, consuming budget if so
    pub fn poll(&mut self, now: u32) -> ReconnectDecision {
        if let Some(max) = self.config.max_attempts {
            if self.attempt_count >= max {
                return ReconnectDecision::Exhausted;
            }
        }

        if let Some(last) = self.last_attempt {
            if elapsed_ms(now, last) < self.current_interval {
                return ReconnectDecision::Wait;
            }
        }

        self.record_attempt(now);
        ReconnectDecision::Attempt(self.attempt_count)
    }

    fn record_attempt(&mut self, now: u32) {
        self.last_attempt = Some(now);
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.current_interval = self
            .current_interval
            .saturating_mul(2)
            .min(self.config.max_interval_ms);
    }

    pub fn current_interval(&self) -> u32 {
        self.current_interval
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn is_exhausted(&self) -> bool {
        self.config
            .max_attempts
            .is_some_and(|max| self.attempt_count >= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn link_config() -> ReconnectConfig {
        ReconnectConfig {
            base_interval_ms: 5000,
            max_interval_ms: 30000,
            max_attempts: Some(3),
        }
    }

    #[test]
    fn test_wait_sequence_doubles_to_ceiling() {
        let mut state = ReconnectState::new(ReconnectConfig {
            max_attempts: None,
            ..link_config()
        });
        state.mark_started(0);

        let mut now = 0u32;
        let mut waits = Vec::new();
        for _ in 0..5 {
            let wait = state.current_interval();
            assert_eq!(state.poll(now + wait - 1), ReconnectDecision::Wait);
            now += wait;
            assert!(matches!(state.poll(now), ReconnectDecision::Attempt(_)));
            waits.push(wait);
        }
        assert_eq!(waits, vec![5000, 10000, 20000, 30000, 30000]);
    }

    #[test]
    fn test_reset_attempts_immediately() {
        let mut state = ReconnectState::new(link_config());
        state.mark_started(100);
        assert_eq!(state.poll(200), ReconnectDecision::Wait);
        state.reset();
        assert_eq!(state.poll(200), ReconnectDecision::Attempt(1));
        assert_eq!(state.current_interval(), 10000);
    }

    #[test]
    fn test_bounded_budget_exhausts() {
        let mut state = ReconnectState::new(link_config());
        let mut now = 0u32;
        for attempt in 1..=3 {
            assert_eq!(state.poll(now), ReconnectDecision::Attempt(attempt));
            now += 60_000;
        }
        assert_eq!(state.poll(now), ReconnectDecision::Exhausted);
        assert!(state.is_exhausted());
    }

    #[test]
    fn test_wait_survives_clock_wraparound() {
        let mut state = ReconnectState::new(link_config());
        let start = u32::MAX - 1000;
        state.mark_started(start);
        assert_eq!(state.poll(start.wrapping_add(4999)), ReconnectDecision::Wait);
        assert_eq!(
            state.poll(start.wrapping_add(5000)),
            ReconnectDecision::Attempt(1)
        );
    }

    #[test]
    fn test_validate() {
        assert!(link_config().validate().is_ok());
        let inverted = ReconnectConfig {
            base_interval_ms: 30000,
            max_interval_ms: 5000,
            max_attempts: None,
        };
        assert!(inverted.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_interval_is_min_of_doubling_and_ceiling(
            base in 1u32..10_000,
            factor in 1u32..16,
            attempts in 0usize..20,
        ) {
            let ceiling = base.saturating_mul(factor);
            let mut state = ReconnectState::new(ReconnectConfig {
                base_interval_ms: base,
                max_interval_ms: ceiling,
                max_attempts: None,
            });
            let mut now = 0u32;
            for k in 0..attempts {
                let expected = u64::from(base)
                    .saturating_mul(1u64 << k.min(40))
                    .min(u64::from(ceiling));
                prop_assert_eq!(u64::from(state.current_interval()), expected);
                now = now.wrapping_add(state.current_interval());
                prop_assert!(matches!(state.poll(now), ReconnectDecision::Attempt(_)));
            }
        }
    }
}
