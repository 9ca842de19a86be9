//! Rolling statistics used to tune dab batching

use std::collections::VecDeque;

/// Mean over the last `window` samples
#[derive(Debug, Clone)]
pub struct RollingMean {
    samples: VecDeque<f64>,
    window: usize,
    sum: f64,
}

impl RollingMean {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.window {
            if let Some(old) = self.samples.pop_front() {
                self.sum -= old;
            }
        }
        self.samples.push_back(value);
        self.sum += value;
    }

    /// Mean of the retained samples, 0 when empty
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum / self.samples.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mean_is_zero() {
        assert_eq!(RollingMean::new(4).mean(), 0.0);
    }

    #[test]
    fn test_window_drops_old_samples() {
        let mut mean = RollingMean::new(3);
        for v in [10.0, 20.0, 30.0] {
            mean.push(v);
        }
        assert!((mean.mean() - 20.0).abs() < 1e-9);

        mean.push(60.0);
        assert_eq!(mean.len(), 3);
        assert!((mean.mean() - (20.0 + 30.0 + 60.0) / 3.0).abs() < 1e-9);
    }
}
