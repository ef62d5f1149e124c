//! Equal-width histograms.
//!
//! Binning computes the bin index directly from the value instead of
//! searching bin edges. Values outside `[lo, hi]` are ignored and a value
//! equal to `hi` is counted in the last bin.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Range and number of equal-width bins.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistogramBins {
    /// Lower edge of the first bin.
    pub lo: f64,
    /// Upper edge of the last bin, inclusive.
    pub hi: f64,
    /// Number of bins.
    pub count: usize,
}

impl HistogramBins {
    /// Bin count used when the range is derived from data.
    pub const DEFAULT_COUNT: usize = 50;

    /// Creates validated bins.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for zero bins, non-finite bounds or `lo > hi`.
    pub fn new(lo: f64, hi: f64, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(Error::InvalidConfig("histogram needs at least one bin".into()));
        }
        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return Err(Error::InvalidConfig(format!(
                "invalid histogram range [{lo}, {hi}]"
            )));
        }
        Ok(Self { lo, hi, count })
    }

    /// The `count + 1` bin edges.
    #[must_use]
    pub fn edges(&self) -> Vec<f64> {
        let step = (self.hi - self.lo) / self.count as f64;
        let mut edges: Vec<f64> = (0..=self.count)
            .map(|i| self.lo + i as f64 * step)
            .collect();
        if let Some(last) = edges.last_mut() {
            *last = self.hi;
        }
        edges
    }

    /// Bin index of `value`, or `None` when it lies outside the range.
    #[inline]
    #[must_use]
    pub fn bin_of(&self, value: f64) -> Option<usize> {
        if !(self.lo <= value && value <= self.hi) {
            return None;
        }
        if self.hi == self.lo {
            return Some(0);
        }
        let scale = self.count as f64 / (self.hi - self.lo);
        let bin = ((value - self.lo) * scale) as usize;
        Some(bin.min(self.count - 1))
    }
}

/// Counts per bin together with the bin edges.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Histogram {
    /// Count of values in every bin.
    pub counts: Vec<u64>,
    /// Bin edges, one more than `counts`.
    pub edges: Vec<f64>,
    bins: HistogramBins,
}

impl Histogram {
    /// Creates an empty histogram over `bins`.
    #[must_use]
    pub fn new(bins: &HistogramBins) -> Self {
        Self {
            counts: vec![0; bins.count],
            edges: bins.edges(),
            bins: *bins,
        }
    }

    /// Bins the histogram was created with.
    #[must_use]
    pub fn bins(&self) -> &HistogramBins {
        &self.bins
    }

    /// Adds `values` to the counts.
    pub fn fill<I: IntoIterator<Item = f64>>(&mut self, values: I) {
        for value in values {
            if let Some(count) = self
                .bins
                .bin_of(value)
                .and_then(|bin| self.counts.get_mut(bin))
            {
                *count += 1;
            }
        }
    }

    /// Adds the counts of `other`, which must share the same bins.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if the bin counts differ and
    /// [`Error::InvalidConfig`] if the ranges differ.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if other.counts.len() != self.counts.len() {
            return Err(Error::LengthMismatch {
                what: "histogram bins",
                expected: self.counts.len(),
                actual: other.counts.len(),
            });
        }
        if other.bins != self.bins {
            return Err(Error::InvalidConfig(format!(
                "histogram range [{}, {}] differs from [{}, {}]",
                other.bins.lo, other.bins.hi, self.bins.lo, self.bins.hi
            )));
        }
        for (total, count) in self.counts.iter_mut().zip(&other.counts) {
            *total += count;
        }
        Ok(())
    }

    /// Total number of counted values.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Histogram of `values` over `count` equal-width bins.
///
/// Without `range` the bins span the minimum and maximum of the data.
///
/// # Errors
/// Returns [`Error::InvalidConfig`] for zero bins, an invalid range, or
/// empty input when the range must be derived.
pub fn equal_width_histogram(
    values: &[f64],
    count: usize,
    range: Option<(f64, f64)>,
) -> Result<Histogram> {
    let (lo, hi) = match range {
        Some(range) => range,
        None => {
            let finite = values.iter().copied().filter(|v| v.is_finite());
            let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            if lo > hi {
                return Err(Error::InvalidConfig(
                    "cannot derive a histogram range from empty input".into(),
                ));
            }
            (lo, hi)
        }
    };
    let bins = HistogramBins::new(lo, hi, count)?;
    let mut histogram = Histogram::new(&bins);
    histogram.fill(values.iter().copied());
    Ok(histogram)
}
