use crate::{check_window, ComputationError, Indicator};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Relative Strength Index (RSI) with Wilder's smoothing of average gain/loss.
///
/// The first output needs `length + 1` values (`length` price changes).
#[derive(Debug, Clone)]
pub struct Rsi {
    len: usize,
    prev_value: Option<Decimal>,
    changes: usize,
    gain_sum: Decimal,
    loss_sum: Decimal,
    averages: Option<(Decimal, Decimal)>,
}

impl Rsi {
    pub fn new(length: usize) -> Self {
        assert!(length > 0, "RSI length must be > 0");
        Self {
            len: length,
            prev_value: None,
            changes: 0,
            gain_sum: Decimal::ZERO,
            loss_sum: Decimal::ZERO,
            averages: None,
        }
    }

    pub fn try_new(length: usize) -> Result<Self, ComputationError> {
        check_window("length", length)?;
        Ok(Self::new(length))
    }

    pub fn value(&self) -> Option<Decimal> {
        let (avg_gain, avg_loss) = self.averages?;
        if avg_loss.is_zero() {
            return Some(dec!(100));
        }
        let rs = avg_gain / avg_loss;
        Some(dec!(100) - dec!(100) / (Decimal::ONE + rs))
    }
}

impl Indicator for Rsi {
    fn next(&mut self, value: Decimal) -> Option<Decimal> {
        if let Some(prev) = self.prev_value {
            let change = value - prev;
            let gain = change.max(Decimal::ZERO);
            let loss = (-change).max(Decimal::ZERO);
            let length = Decimal::from(self.len);

            self.averages = match self.averages {
                None => {
                    self.changes += 1;
                    self.gain_sum += gain;
                    self.loss_sum += loss;
                    if self.changes >= self.len {
                        Some((self.gain_sum / length, self.loss_sum / length))
                    } else {
                        None
                    }
                }
                Some((avg_gain, avg_loss)) => Some((
                    (avg_gain * (length - Decimal::ONE) + gain) / length,
                    (avg_loss * (length - Decimal::ONE) + loss) / length,
                )),
            };
        }

        self.prev_value = Some(value);
        self.value()
    }

    fn reset(&mut self) {
        self.prev_value = None;
        self.changes = 0;
        self.gain_sum = Decimal::ZERO;
        self.loss_sum = Decimal::ZERO;
        self.averages = None;
    }

    fn period(&self) -> usize {
        self.len + 1
    }

    fn is_ready(&self) -> bool {
        self.averages.is_some()
    }
}
