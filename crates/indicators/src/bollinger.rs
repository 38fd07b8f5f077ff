use crate::sma::Sma;
use crate::{check_window, ComputationError, Indicator};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Bollinger Bands: SMA middle band with a `multiplier` x standard deviation envelope.
///
/// `Indicator::next` yields the middle band; use `next_bands` for all three.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    len: usize,
    multiplier: Decimal,
    sma: Sma,
    window: VecDeque<Decimal>,
    current: Option<Bands>,
}

/// One Bollinger Bands sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bands {
    pub lower: Decimal,
    pub middle: Decimal,
    pub upper: Decimal,
}

impl Bands {
    pub fn width(&self) -> Decimal {
        self.upper - self.lower
    }
}

impl BollingerBands {
    pub fn new(length: usize, multiplier: Decimal) -> Self {
        Self {
            len: length,
            multiplier,
            sma: Sma::new(length),
            window: VecDeque::with_capacity(length + 1),
            current: None,
        }
    }

    /// Checked constructor: the window must hold a value and the multiplier must not be negative.
    pub fn try_new(length: usize, multiplier: Decimal) -> Result<Self, ComputationError> {
        check_window("length", length)?;
        if multiplier.is_sign_negative() {
            return Err(ComputationError::InvalidMultiplier(multiplier));
        }
        Ok(Self::new(length, multiplier))
    }

    /// Standard Bollinger Bands (20, 2).
    pub fn default_periods() -> Self {
        Self::new(20, Decimal::TWO)
    }

    /// Population standard deviation of the window around `mean`.
    fn std_dev(&self, mean: Decimal) -> Decimal {
        if self.window.len() < 2 {
            return Decimal::ZERO;
        }
        let variance = self
            .window
            .iter()
            .map(|v| {
                let diff = *v - mean;
                diff * diff
            })
            .sum::<Decimal>()
            / Decimal::from(self.window.len());

        decimal_sqrt(variance)
    }

    pub fn bands(&self) -> Option<Bands> {
        self.current
    }

    pub fn next_bands(&mut self, value: Decimal) -> Option<Bands> {
        self.window.push_back(value);
        if self.window.len() > self.len {
            self.window.pop_front();
        }

        if let Some(middle) = self.sma.next(value) {
            let envelope = self.multiplier * self.std_dev(middle);
            self.current = Some(Bands {
                lower: middle - envelope,
                middle,
                upper: middle + envelope,
            });
        }

        self.current
    }
}

impl Indicator for BollingerBands {
    fn next(&mut self, value: Decimal) -> Option<Decimal> {
        self.next_bands(value).map(|b| b.middle)
    }

    fn reset(&mut self) {
        self.sma.reset();
        self.window.clear();
        self.current = None;
    }

    fn period(&self) -> usize {
        self.len
    }

    fn is_ready(&self) -> bool {
        self.current.is_some()
    }
}

/// Newton's method square root for Decimal.
pub fn decimal_sqrt(value: Decimal) -> Decimal {
    if value <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let mut guess = value / Decimal::TWO;
    let epsilon = Decimal::new(1, 10);
    for _ in 0..100 {
        let next_guess = (guess + value / guess) / Decimal::TWO;
        let diff = (next_guess - guess).abs();
        guess = next_guess;
        if diff < epsilon {
            break;
        }
    }
    guess
}
