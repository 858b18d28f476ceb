/// Maximum difference allowed per color channel when probing.
#[derive(Debug, Clone, PartialEq)]
pub struct Tolerance {
    value: [f64; 4],
    is_percent: bool,
}

impl Tolerance {
    pub fn new(value: [f64; 4], is_percent: bool) -> Tolerance {
        Tolerance { value, is_percent }
    }

    /// Checks whether `observed` is close enough to `expected` for the given channel.
    ///
    /// A percentage tolerance is relative to the expected value.
    pub fn equal(&self, channel: usize, observed: f64, expected: f64) -> bool {
        let allowed = if self.is_percent {
            (self.value[channel] / 100.0 * expected).abs()
        } else {
            self.value[channel]
        };

        (observed - expected).abs() <= allowed
    }

    /// Compares the first `n` channels of two pixels.
    pub fn pixel_equal(&self, observed: &[f64], expected: &[f64]) -> bool {
        observed.iter()
                .zip(expected)
                .enumerate()
                .all(|(channel, (&o, &e))| self.equal(channel, o, e))
    }
}

impl Default for Tolerance {
    fn default() -> Tolerance {
        Tolerance {
            value: [0.01; 4],
            is_percent: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute() {
        let tolerance = Tolerance::new([0.1, 0.2, 0.0, 1.0], false);

        assert!(tolerance.equal(0, 0.55, 0.5));
        assert!(!tolerance.equal(0, 0.65, 0.5));
        assert!(tolerance.equal(1, 0.3, 0.5));
        assert!(tolerance.equal(2, 0.5, 0.5));
        assert!(!tolerance.equal(2, 0.5001, 0.5));
        assert!(tolerance.equal(3, -0.4, 0.5));
    }

    #[test]
    fn percent() {
        let tolerance = Tolerance::new([10.0; 4], true);

        assert!(tolerance.equal(0, 95.0, 100.0));
        assert!(!tolerance.equal(0, 89.0, 100.0));
        assert!(tolerance.equal(1, -1.05, -1.0));
        assert!(tolerance.equal(2, 0.0, 0.0));
    }

    #[test]
    fn default_accepts_8_bit_rounding() {
        let tolerance = Tolerance::default();

        assert!(tolerance.pixel_equal(&[128.0 / 255.0, 0.0, 1.0], &[0.5, 0.0, 1.0]));
        assert!(!tolerance.pixel_equal(&[0.52, 0.0, 1.0, 1.0], &[0.5, 0.0, 1.0, 1.0]));
    }
}
