use std::collections::VecDeque;

use itertools::{Itertools, MinMaxResult};
use sunsink_quantities::Watts;

use crate::prelude::*;

/// Outlier filter applied to the power history.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum Filter {
    /// Sorted element at index `⌈N/2⌉`, robust to single-sample spikes.
    #[default]
    Median,

    /// Mean of the samples without the single minimum and the single maximum.
    TrimmedMean,
}

/// Fixed-size smoothing window over the latest meter readings.
///
/// The window is pre-filled with zeros, so it always holds exactly `size` samples.
pub struct PowerHistory {
    samples: VecDeque<Watts>,
}

impl PowerHistory {
    pub const MIN_SIZE: usize = 3;

    pub fn new(size: usize) -> Result<Self> {
        ensure!(
            size >= Self::MIN_SIZE,
            "power history must hold at least {} samples, got {size}",
            Self::MIN_SIZE,
        );
        Ok(Self { samples: std::iter::repeat_n(Watts::ZERO, size).collect() })
    }

    /// Append the sample and evict the oldest one.
    pub fn push(&mut self, power: Watts) {
        self.samples.pop_front();
        self.samples.push_back(power);
    }

    pub fn filtered(&self, filter: Filter) -> Watts {
        match filter {
            Filter::Median => self.median(),
            Filter::TrimmedMean => self.trimmed_mean(),
        }
    }

    /// Note the index: it is `⌈N/2⌉`, which is one above the middle for odd sizes.
    fn median(&self) -> Watts {
        let mut values = self.samples.iter().copied().collect_vec();
        let index = values.len().div_ceil(2);
        *values.select_nth_unstable(index).1
    }

    #[expect(clippy::cast_precision_loss)]
    fn trimmed_mean(&self) -> Watts {
        let total: Watts = self.samples.iter().copied().sum();
        let (min, max) = match self.samples.iter().copied().minmax() {
            MinMaxResult::MinMax(min, max) => (min, max),
            MinMaxResult::OneElement(value) => (value, value),
            MinMaxResult::NoElements => (Watts::ZERO, Watts::ZERO),
        };
        (total - min - max) / (self.samples.len() - 2) as f64
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn history_of(values: &[i32]) -> Result<PowerHistory> {
        let mut history = PowerHistory::new(values.len())?;
        for value in values {
            history.push(Watts::from(*value));
        }
        Ok(history)
    }

    #[test]
    fn too_small_history_is_rejected() {
        assert!(PowerHistory::new(2).is_err());
        assert!(PowerHistory::new(3).is_ok());
    }

    #[test]
    fn size_is_constant() -> Result {
        let mut history = PowerHistory::new(7)?;
        assert_eq!(history.samples.len(), 7);
        for value in -20..20 {
            history.push(Watts::from(value * 37));
            assert_eq!(history.samples.len(), 7);
        }
        Ok(())
    }

    #[test]
    fn evicts_oldest_first() -> Result {
        let mut history = history_of(&[1, 2, 3])?;
        history.push(Watts::from(4));
        assert_eq!(history.samples, [Watts::from(2), Watts::from(3), Watts::from(4)]);
        Ok(())
    }

    #[test]
    fn starts_with_zeros() -> Result {
        let history = PowerHistory::new(7)?;
        assert_eq!(history.filtered(Filter::Median), Watts::ZERO);
        assert_eq!(history.filtered(Filter::TrimmedMean), Watts::ZERO);
        Ok(())
    }

    #[test]
    fn median_odd_size_takes_upper_index() -> Result {
        let history = history_of(&[7, 1, 6, 2, 5, 3, 4])?;
        assert_eq!(history.filtered(Filter::Median), Watts::from(5));
        Ok(())
    }

    #[test]
    fn median_even_size() -> Result {
        let history = history_of(&[10, 9, 8, 7, 6, 5, 4, 3, 2, 1])?;
        assert_eq!(history.filtered(Filter::Median), Watts::from(6));
        Ok(())
    }

    #[test]
    fn median_ignores_single_spike() -> Result {
        let history = history_of(&[-200, -210, -190, 3000, -205, -195, -200])?;
        assert_eq!(history.filtered(Filter::Median), Watts::from(-195));
        Ok(())
    }

    #[test]
    fn trimmed_mean_drops_extremes() -> Result {
        let history = history_of(&[-1000, 100, 200, 300, 5000])?;
        assert_abs_diff_eq!(history.filtered(Filter::TrimmedMean).0.0, 200.0);
        Ok(())
    }

    #[test]
    fn trimmed_mean_drops_only_one_of_duplicated_extremes() -> Result {
        let history = history_of(&[0, 0, 30, 30])?;
        assert_abs_diff_eq!(history.filtered(Filter::TrimmedMean).0.0, 15.0);
        Ok(())
    }

    #[test]
    fn filters_do_not_depend_on_insertion_order() -> Result {
        let values = [-300, 40, -300, 125, 7];
        let expected_median = history_of(&values)?.filtered(Filter::Median);
        let expected_mean = history_of(&values)?.filtered(Filter::TrimmedMean);
        for permutation in values.iter().copied().permutations(values.len()) {
            let history = history_of(&permutation)?;
            assert_eq!(history.filtered(Filter::Median), expected_median);
            assert_abs_diff_eq!(
                history.filtered(Filter::TrimmedMean).0.0,
                expected_mean.0.0,
                epsilon = 1e-9
            );
        }
        Ok(())
    }
}
