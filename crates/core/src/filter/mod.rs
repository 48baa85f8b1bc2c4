use std::f64::consts::TAU;

/// Per-frame weight of a single-pole low-pass running at `frequency` Hz for
/// a frame interval of `dt` seconds.
pub fn smoothing_factor(frequency: f64, dt: f64) -> f64 {
    if !(frequency > 0.0 && dt > 0.0) {
        return 1.0;
    }
    (1.0 - (-TAU * frequency * dt).exp()).clamp(f64::EPSILON, 1.0)
}

/// Single-pole low-pass filter applied to the leveling scale.
///
/// Each call emits the value the filter currently holds and then moves the
/// held value toward the new target, so a step in the target shows up on the
/// following frames rather than the frame it arrives on.
#[derive(Debug, Default, Clone)]
pub struct ScaleFilter {
    held: Option<f64>,
}

impl ScaleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, target: f64, frequency: f64, dt: f64) -> f64 {
        match self.held {
            None => {
                self.held = Some(target);
                target
            }
            Some(previous) => {
                let alpha = smoothing_factor(frequency, dt);
                self.held = Some(alpha.mul_add(target - previous, previous));
                previous
            }
        }
    }

    /// Restarts the filter from `value`, used when the crop policy changes so
    /// the output continues from what was last shown.
    pub fn reseed(&mut self, value: f64) {
        self.held = Some(value);
    }

    pub fn reset(&mut self) {
        self.held = None;
    }

    pub fn held(&self) -> Option<f64> {
        self.held
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 30.0;

    #[test]
    fn first_value_passes_through() {
        let mut filter = ScaleFilter::new();
        assert_eq!(filter.apply(1.4, 1.8, DT), 1.4);
        assert_eq!(filter.held(), Some(1.4));
    }

    #[test]
    fn step_is_delayed_then_approached() {
        let mut filter = ScaleFilter::new();
        filter.apply(1.0, 1.8, DT);

        assert_eq!(filter.apply(2.0, 1.8, DT), 1.0);

        let mut last = 1.0;
        for _ in 0..60 {
            let value = filter.apply(2.0, 1.8, DT);
            assert!(value >= last);
            assert!(value <= 2.0);
            last = value;
        }
        assert!((last - 2.0).abs() < 1e-3);
    }

    #[test]
    fn higher_frequency_converges_faster() {
        let mut slow = ScaleFilter::new();
        let mut fast = ScaleFilter::new();
        slow.apply(1.0, 1.0, DT);
        fast.apply(1.0, 5.0, DT);

        let mut slow_value = 1.0;
        let mut fast_value = 1.0;
        for _ in 0..5 {
            slow_value = slow.apply(2.0, 1.0, DT);
            fast_value = fast.apply(2.0, 5.0, DT);
        }
        assert!(fast_value > slow_value);
    }

    #[test]
    fn reseed_continues_from_value() {
        let mut filter = ScaleFilter::new();
        filter.apply(2.0, 1.8, DT);
        filter.reseed(1.2);
        assert_eq!(filter.apply(2.0, 1.8, DT), 1.2);
    }

    #[test]
    fn degenerate_inputs_do_not_stall() {
        assert_eq!(smoothing_factor(1.8, 0.0), 1.0);
        assert!(smoothing_factor(1.8, DT) > 0.0 && smoothing_factor(1.8, DT) < 1.0);
    }
}
