use crate::{check_window, ComputationError, Indicator};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Arithmetic mean of the newest `length` values.
#[derive(Debug, Clone)]
pub struct Sma {
    length: usize,
    window: VecDeque<Decimal>,
    total: Decimal,
}

impl Sma {
    pub fn new(length: usize) -> Self {
        assert!(length >= 1, "moving average needs a window of at least one value");
        Self {
            length,
            window: VecDeque::with_capacity(length),
            total: Decimal::ZERO,
        }
    }

    /// Like [`Sma::new`], but rejects an empty window instead of panicking.
    pub fn try_new(length: usize) -> Result<Self, ComputationError> {
        check_window("length", length)?;
        Ok(Self::new(length))
    }

    pub fn value(&self) -> Option<Decimal> {
        self.is_ready()
            .then(|| self.total / Decimal::from(self.length))
    }
}

impl Indicator for Sma {
    fn next(&mut self, value: Decimal) -> Option<Decimal> {
        if self.window.len() == self.length {
            if let Some(oldest) = self.window.pop_front() {
                self.total -= oldest;
            }
        }
        self.window.push_back(value);
        self.total += value;
        self.value()
    }

    fn reset(&mut self) {
        self.window.clear();
        self.total = Decimal::ZERO;
    }

    fn period(&self) -> usize {
        self.length
    }

    fn is_ready(&self) -> bool {
        self.window.len() == self.length
    }
}
