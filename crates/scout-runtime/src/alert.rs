//! [`AlertController`] – timed buzzer patterns encoding event severity.
//!
//! A pattern blocks for its full duration so the alert is perceptible before
//! the loop moves on.  Actuator faults are logged and the pattern is
//! abandoned; they never reach the caller.

use std::thread;
use std::time::Duration;

use scout_hal::relay::Relay;
use tracing::{debug, warn};

/// `pulses` on/off cycles with fixed timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPattern {
    pub pulses: u32,
    pub on: Duration,
    pub off: Duration,
}

impl AlertPattern {
    /// Something is inside the proximity threshold.
    pub const PROXIMITY: AlertPattern = AlertPattern::new(3, 100, 100);
    /// The detector reported at least one object.
    pub const DETECTION: AlertPattern = AlertPattern::new(2, 100, 100);
    /// A cycle failed as a whole.
    pub const ERROR: AlertPattern = AlertPattern::new(5, 200, 200);

    const fn new(pulses: u32, on_ms: u64, off_ms: u64) -> Self {
        Self {
            pulses,
            on: Duration::from_millis(on_ms),
            off: Duration::from_millis(off_ms),
        }
    }

    /// Same pulse count with zero-length timings, for headless runs.
    pub const fn silent_timing(self) -> Self {
        Self {
            pulses: self.pulses,
            on: Duration::ZERO,
            off: Duration::ZERO,
        }
    }

    /// Wall-clock time the pattern blocks for.
    pub fn total_duration(&self) -> Duration {
        (self.on + self.off) * self.pulses
    }
}

pub struct AlertController {
    relay: Box<dyn Relay>,
}

impl AlertController {
    pub fn new(relay: Box<dyn Relay>) -> Self {
        Self { relay }
    }

    /// Drive the actuator on/off `pulses` times.
    ///
    /// Returns `false` if the pattern was cut short by an actuator fault.
    pub fn signal(&mut self, pulses: u32, on: Duration, off: Duration) -> bool {
        debug!(relay = self.relay.id(), pulses, "alert pattern");
        for _ in 0..pulses {
            if let Err(e) = self.relay.set_state(true) {
                warn!(relay = self.relay.id(), error = %e, "alert actuator failed; abandoning pattern");
                self.silence();
                return false;
            }
            thread::sleep(on);
            if let Err(e) = self.relay.set_state(false) {
                warn!(relay = self.relay.id(), error = %e, "alert actuator failed; abandoning pattern");
                return false;
            }
            thread::sleep(off);
        }
        true
    }

    pub fn play(&mut self, pattern: AlertPattern) -> bool {
        self.signal(pattern.pulses, pattern.on, pattern.off)
    }

    /// Force the actuator off.
    pub fn silence(&mut self) {
        if let Err(e) = self.relay.set_state(false) {
            warn!(relay = self.relay.id(), error = %e, "failed to silence alert actuator");
        }
    }

    pub fn is_sounding(&self) -> bool {
        self.relay.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_hal::sim::SimBuzzer;
    use scout_types::ScoutError;
    use std::sync::atomic::Ordering;

    struct StuckRelay {
        state: bool,
        fail_on: bool,
    }

    impl Relay for StuckRelay {
        fn id(&self) -> &str {
            "stuck"
        }

        fn set_state(&mut self, active: bool) -> Result<(), ScoutError> {
            if active && self.fail_on {
                return Err(ScoutError::DeviceUnavailable {
                    component: "stuck".into(),
                    details: "gpio17 busy".into(),
                });
            }
            self.state = active;
            Ok(())
        }

        fn state(&self) -> bool {
            self.state
        }
    }

    #[test]
    fn signal_pulses_exactly_n_times_and_ends_off() {
        let buzzer = SimBuzzer::new("buzzer");
        let pulses = buzzer.pulse_counter();
        let mut alerts = AlertController::new(Box::new(buzzer));
        assert!(alerts.signal(3, Duration::ZERO, Duration::ZERO));
        assert_eq!(pulses.load(Ordering::SeqCst), 3);
        assert!(!alerts.is_sounding());
    }

    #[test]
    fn builtin_patterns() {
        assert_eq!(AlertPattern::PROXIMITY.pulses, 3);
        assert_eq!(AlertPattern::DETECTION.pulses, 2);
        assert_eq!(AlertPattern::ERROR.pulses, 5);
        assert_eq!(AlertPattern::ERROR.on, Duration::from_millis(200));
        assert_eq!(AlertPattern::PROXIMITY.total_duration(), Duration::from_millis(600));
        assert_eq!(AlertPattern::ERROR.silent_timing().total_duration(), Duration::ZERO);
    }

    #[test]
    fn play_uses_pattern_pulse_count() {
        let buzzer = SimBuzzer::new("buzzer");
        let pulses = buzzer.pulse_counter();
        let mut alerts = AlertController::new(Box::new(buzzer));
        alerts.play(AlertPattern::DETECTION.silent_timing());
        assert_eq!(pulses.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn actuator_failure_is_swallowed() {
        let mut alerts = AlertController::new(Box::new(StuckRelay {
            state: false,
            fail_on: true,
        }));
        assert!(!alerts.signal(5, Duration::ZERO, Duration::ZERO));
        assert!(!alerts.is_sounding());
    }

    #[test]
    fn zero_pulses_is_a_no_op() {
        let buzzer = SimBuzzer::new("buzzer");
        let pulses = buzzer.pulse_counter();
        let mut alerts = AlertController::new(Box::new(buzzer));
        assert!(alerts.signal(0, Duration::ZERO, Duration::ZERO));
        assert_eq!(pulses.load(Ordering::SeqCst), 0);
    }
}
