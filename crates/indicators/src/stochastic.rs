use crate::sma::Sma;
use crate::{check_window, ComputationError, Indicator};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;

/// Stochastic Oscillator (%K and %D).
///
/// raw %K = (Close - Lowest Low) / (Highest High - Lowest Low) * 100 over `length` periods
/// %K = SMA(raw %K, k_smoothing)
/// %D = SMA(%K, d_smoothing)
#[derive(Debug, Clone)]
pub struct Stochastic {
    len: usize,
    highs: VecDeque<Decimal>,
    lows: VecDeque<Decimal>,
    k_smoother: Sma,
    d_smoother: Sma,
    current: Option<StochasticOutput>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticOutput {
    pub k: Decimal,
    pub d: Decimal,
}

impl Stochastic {
    pub fn new(length: usize, k_smoothing: usize, d_smoothing: usize) -> Self {
        assert!(length > 0, "Stochastic length must be > 0");
        Self {
            len: length,
            highs: VecDeque::with_capacity(length + 1),
            lows: VecDeque::with_capacity(length + 1),
            k_smoother: Sma::new(k_smoothing),
            d_smoother: Sma::new(d_smoothing),
            current: None,
        }
    }

    /// Checked constructor: every window must hold at least one value.
    pub fn try_new(
        length: usize,
        k_smoothing: usize,
        d_smoothing: usize,
    ) -> Result<Self, ComputationError> {
        check_window("length", length)?;
        check_window("k_smoothing", k_smoothing)?;
        check_window("d_smoothing", d_smoothing)?;
        Ok(Self::new(length, k_smoothing, d_smoothing))
    }

    /// Standard slow Stochastic (14, 3, 3).
    pub fn default_periods() -> Self {
        Self::new(14, 3, 3)
    }

    pub fn next_hlc(
        &mut self,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Option<StochasticOutput> {
        self.highs.push_back(high);
        self.lows.push_back(low);

        if self.highs.len() > self.len {
            self.highs.pop_front();
            self.lows.pop_front();
        }

        if self.highs.len() < self.len {
            return None;
        }

        let highest = self.highs.iter().copied().max()?;
        let lowest = self.lows.iter().copied().min()?;
        let range = highest - lowest;
        let raw_k = if range.is_zero() {
            dec!(50)
        } else {
            (close - lowest) / range * dec!(100)
        };

        let k = self.k_smoother.next(raw_k)?;
        let d = self.d_smoother.next(k)?;
        self.current = Some(StochasticOutput { k, d });
        self.current
    }

    pub fn output(&self) -> Option<StochasticOutput> {
        self.current
    }
}

impl Indicator for Stochastic {
    fn next(&mut self, value: Decimal) -> Option<Decimal> {
        // Single-price feeds use the value as high, low and close.
        self.next_hlc(value, value, value).map(|o| o.k)
    }

    fn reset(&mut self) {
        self.highs.clear();
        self.lows.clear();
        self.k_smoother.reset();
        self.d_smoother.reset();
        self.current = None;
    }

    fn period(&self) -> usize {
        self.len + self.k_smoother.period() + self.d_smoother.period() - 2
    }

    fn is_ready(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stochastic_needs_full_smoothing_chain() {
        let mut stoch = Stochastic::new(3, 1, 2);
        assert_eq!(stoch.period(), 4);
        assert!(stoch.next_hlc(dec!(1), dec!(1), dec!(1)).is_none());
        assert!(stoch.next_hlc(dec!(2), dec!(2), dec!(2)).is_none());
        assert!(stoch.next_hlc(dec!(3), dec!(3), dec!(3)).is_none());
        let out = stoch.next_hlc(dec!(4), dec!(4), dec!(4)).unwrap();
        assert_eq!(out.k, dec!(100));
        assert_eq!(out.d, dec!(100));
    }

    #[test]
    fn test_stochastic_try_new_names_the_bad_window() {
        assert_eq!(
            Stochastic::try_new(14, 0, 3).unwrap_err(),
            ComputationError::InvalidWindow {
                name: "k_smoothing",
                length: 0
            }
        );
        assert_eq!(
            Stochastic::try_new(14, 3, 0).unwrap_err(),
            ComputationError::InvalidWindow {
                name: "d_smoothing",
                length: 0
            }
        );
        assert!(Stochastic::try_new(0, 3, 3).is_err());
        assert_eq!(Stochastic::try_new(3, 1, 2).unwrap().period(), 4);
    }

    #[test]
    fn test_stochastic_close_at_range_bottom() {
        let mut stoch = Stochastic::new(2, 1, 1);
        stoch.next_hlc(dec!(10), dec!(8), dec!(9));
        let out = stoch.next_hlc(dec!(12), dec!(6), dec!(6)).unwrap();
        assert_eq!(out.k, Decimal::ZERO);
        assert_eq!(out.d, Decimal::ZERO);
    }

    #[test]
    fn test_stochastic_flat_range_is_midpoint() {
        let mut stoch = Stochastic::new(2, 1, 1);
        stoch.next(dec!(5));
        assert_eq!(stoch.next(dec!(5)), Some(dec!(50)));
    }
}
