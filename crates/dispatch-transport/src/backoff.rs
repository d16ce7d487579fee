//! Jittered exponential reconnect backoff, grounded on the teacher's
//! `hooteproto::lazy_pirate::LazyPirateConfig::backoff_for_attempt` (there
//! capping a ZMQ REQ socket's retry delay; here capping MQTT reconnect
//! attempts at 100ms-30s per spec §4.2).

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self { base: Duration::from_millis(100), max: Duration::from_secs(30) }
    }
}

impl BackoffConfig {
    /// Delay before reconnect attempt `attempt` (1-indexed), with up to
    /// 20% jitter to avoid every robot's client racing to reconnect in
    /// lockstep after a broker restart.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base.saturating_mul(multiplier).min(self.max);
        let jitter_frac: f64 = rand::thread_rng().gen_range(0.0..0.2);
        delay.mul_f64(1.0 + jitter_frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps_at_max() {
        let cfg = BackoffConfig::default();
        assert!(cfg.delay_for_attempt(1) >= cfg.base);
        assert!(cfg.delay_for_attempt(1) < cfg.base * 2);
        for attempt in 10..20 {
            let d = cfg.delay_for_attempt(attempt);
            assert!(d <= cfg.max.mul_f64(1.2));
        }
    }

    #[test]
    fn zero_attempt_is_immediate() {
        assert_eq!(BackoffConfig::default().delay_for_attempt(0), Duration::ZERO);
    }
}
