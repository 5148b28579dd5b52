use std::time::Duration;

/// Growth step and ceiling of the adaptive delay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub step: Duration,
    pub max: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            step: Duration::from_millis(100),
            max: Duration::from_secs(30),
        }
    }
}

/// Pause applied by the delivery loop between sends.
///
/// Every throttled response adds one step; every success takes a third of a
/// step back, so the rate recovers slowly after the server pushes back. The
/// value stays within `[0, max]`.
#[derive(Clone, Debug)]
pub struct AdaptiveDelay {
    config: ThrottleConfig,
    current: Duration,
}

impl AdaptiveDelay {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            current: Duration::ZERO,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn on_throttled(&mut self) {
        self.current = (self.current + self.config.step).min(self.config.max);
    }

    pub fn on_success(&mut self) {
        self.current = self.current.saturating_sub(self.config.step / 3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_on_throttle_and_decays_on_success() {
        let mut delay = AdaptiveDelay::new(ThrottleConfig::default());
        delay.on_throttled();
        delay.on_throttled();
        assert_eq!(delay.current(), Duration::from_millis(200));

        delay.on_success();
        assert!(delay.current() < Duration::from_millis(200));
        assert!(delay.current() > Duration::from_millis(100));
    }

    #[test]
    fn never_negative() {
        let mut delay = AdaptiveDelay::new(ThrottleConfig::default());
        delay.on_success();
        assert_eq!(delay.current(), Duration::ZERO);

        delay.on_throttled();
        for _ in 0..10 {
            delay.on_success();
        }
        assert_eq!(delay.current(), Duration::ZERO);
    }

    #[test]
    fn capped_at_max() {
        let mut delay = AdaptiveDelay::new(ThrottleConfig {
            step: Duration::from_secs(7),
            max: Duration::from_secs(30),
        });
        for _ in 0..10 {
            delay.on_throttled();
        }
        assert_eq!(delay.current(), Duration::from_secs(30));
    }
}
