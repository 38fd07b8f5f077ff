use crate::sma::Sma;
use crate::{check_window, ComputationError, Indicator};
use rust_decimal::Decimal;

/// Exponential moving average with smoothing `2 / (length + 1)`.
///
/// The first output is the simple average of the first `length` values; every
/// later output moves the previous one toward the new value by the smoothing factor.
#[derive(Debug, Clone)]
pub struct Ema {
    smoothing: Decimal,
    seed: Sma,
    current: Option<Decimal>,
}

impl Ema {
    pub fn new(length: usize) -> Self {
        Self {
            smoothing: Decimal::TWO / Decimal::from(length + 1),
            seed: Sma::new(length),
            current: None,
        }
    }

    pub fn try_new(length: usize) -> Result<Self, ComputationError> {
        check_window("length", length)?;
        Ok(Self::new(length))
    }

    pub fn value(&self) -> Option<Decimal> {
        self.current
    }
}

impl Indicator for Ema {
    fn next(&mut self, value: Decimal) -> Option<Decimal> {
        self.current = match self.current {
            Some(previous) => Some(previous + self.smoothing * (value - previous)),
            None => self.seed.next(value),
        };
        self.current
    }

    fn reset(&mut self) {
        self.seed.reset();
        self.current = None;
    }

    fn period(&self) -> usize {
        self.seed.period()
    }

    fn is_ready(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_seeded_with_simple_average() {
        let mut ema = Ema::new(3);
        assert_eq!(ema.next(dec!(2)), None);
        assert_eq!(ema.next(dec!(4)), None);
        assert_eq!(ema.next(dec!(6)), Some(dec!(4)));
        // smoothing 0.5: 4 + 0.5 * (8 - 4)
        assert_eq!(ema.next(dec!(8)), Some(dec!(6)));
    }

    #[test]
    fn test_constant_input_is_a_fixed_point() {
        let mut ema = Ema::new(4);
        let last = (0..20).filter_map(|_| ema.next(dec!(1.5))).last();
        assert_eq!(last, Some(dec!(1.5)));
        ema.reset();
        assert!(Ema::try_new(0).is_err());
        assert!(!ema.is_ready());
        assert_eq!(ema.period(), 4);
    }
}
