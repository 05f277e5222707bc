//! Interarrival jitter estimation (RFC 3550, section 6.4.1)

/// Gain divisor fixed by RFC 3550
const JITTER_GAIN: f64 = 16.0;

/// RFC 3550 interarrival jitter estimator
///
/// Tracks the smoothed mean deviation between the spacing of arrivals and
/// the spacing of the corresponding send times. All values are seconds.
#[derive(Debug, Clone, Default)]
pub struct JitterEstimator {
    /// Current jitter estimate
    jitter: f64,
    /// Previous (sender_ts, arrival_ts) pair
    previous: Option<(f64, f64)>,
}

impl JitterEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet and return the updated estimate
    ///
    /// The first packet only establishes a reference point and leaves the
    /// estimate at zero.
    pub fn update(&mut self, sender_ts: f64, arrival_ts: f64) -> f64 {
        if let Some((prev_sender, prev_arrival)) = self.previous {
            let d = ((arrival_ts - prev_arrival) - (sender_ts - prev_sender)).abs();
            self.jitter += (d - self.jitter) / JITTER_GAIN;
        }

        self.previous = Some((sender_ts, arrival_ts));
        self.jitter
    }

    /// Current jitter estimate in seconds
    pub fn jitter(&self) -> f64 {
        self.jitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_is_reference_only() {
        let mut est = JitterEstimator::new();
        assert_eq!(est.update(10.0, 12.5), 0.0);
        assert_eq!(est.jitter(), 0.0);
    }

    #[test]
    fn test_constant_delay_cancels() {
        let mut est = JitterEstimator::new();
        est.update(0.0, 0.0);
        assert_eq!(est.update(1.0, 1.0), 0.0);
    }

    #[test]
    fn test_single_deviation() {
        let mut est = JitterEstimator::new();
        est.update(0.0, 0.0);
        let j = est.update(1.0, 1.01);
        assert!((j - 0.000625).abs() < 1e-12);
    }

    #[test]
    fn test_negative_deviation_uses_magnitude() {
        let mut est = JitterEstimator::new();
        est.update(0.0, 0.0);
        let j = est.update(1.0, 0.99);
        assert!((j - 0.000625).abs() < 1e-12);
    }

    #[test]
    fn test_converges_towards_steady_deviation() {
        let mut est = JitterEstimator::new();
        // Arrivals alternate between 0 and 20ms late, so every |D| is 20ms
        for i in 0..500 {
            let send = i as f64 * 0.1;
            let extra = if i % 2 == 0 { 0.0 } else { 0.02 };
            est.update(send, send + extra);
        }
        assert!((est.jitter() - 0.02).abs() < 1e-6);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn jitter_stays_within_largest_deviation(
                samples in prop::collection::vec((0.0f64..10.0, 0.0f64..0.5), 2..64)
            ) {
                let mut est = JitterEstimator::new();
                let mut send = 0.0;
                let mut max_d: f64 = 0.0;
                let mut prev: Option<(f64, f64)> = None;

                for (gap, delay) in samples {
                    send += gap;
                    let arrival = send + delay;
                    if let Some((ps, pa)) = prev {
                        max_d = max_d.max(((arrival - pa) - (send - ps)).abs());
                    }
                    prev = Some((send, arrival));

                    let j = est.update(send, arrival);
                    prop_assert!(j >= 0.0);
                    prop_assert!(j <= max_d + 1e-9);
                }
            }
        }
    }
}
