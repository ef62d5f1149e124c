//! Correction configuration: region of interest, threshold and histogram bins.

use ndarray::ArrayViewMut2;
use xfelpix_core::slicing::{ArraySlice, SliceSpec};
use xfelpix_core::{HistogramBins, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Row and column ranges cropped from every frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Roi {
    /// Row range.
    pub rows: SliceSpec,
    /// Column range.
    pub cols: SliceSpec,
}

impl Roi {
    /// The full frame.
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    /// Creates a region from row and column ranges.
    #[must_use]
    pub fn new(rows: impl Into<SliceSpec>, cols: impl Into<SliceSpec>) -> Self {
        Self {
            rows: rows.into(),
            cols: cols.into(),
        }
    }

    /// Returns true if the region covers the whole frame.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.rows.is_full() && self.cols.is_full()
    }

    /// The region as a two-axis array slice.
    #[must_use]
    pub fn to_slice(&self) -> ArraySlice {
        ArraySlice::new(vec![self.rows, self.cols])
    }

    /// Shape of a frame of `shape` after cropping.
    ///
    /// # Errors
    /// Returns an error if `shape` is not two-dimensional or a step is zero.
    pub fn cropped_shape(&self, shape: &[usize]) -> Result<Vec<usize>> {
        self.to_slice().sliced_shape(shape)
    }
}

/// Clipping bounds: values below `lo` or above `hi` are set to zero.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Threshold {
    /// Values strictly below become zero.
    pub lo: Option<f64>,
    /// Values strictly above become zero.
    pub hi: Option<f64>,
}

impl Threshold {
    /// Creates a threshold; `None` leaves a side unbounded.
    #[must_use]
    pub fn new(lo: Option<f64>, hi: Option<f64>) -> Self {
        Self { lo, hi }
    }

    /// Returns true if neither side is bounded.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.lo.is_none() && self.hi.is_none()
    }

    /// Zeroes out-of-range values in place.
    pub fn apply(&self, mut frame: ArrayViewMut2<'_, f64>) {
        if self.is_unbounded() {
            return;
        }
        let (lo, hi) = (self.lo, self.hi);
        frame.mapv_inplace(|v| {
            if lo.is_some_and(|lo| v < lo) || hi.is_some_and(|hi| v > hi) {
                0.0
            } else {
                v
            }
        });
    }
}

/// Configuration of a frame correction pipeline.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorrectionConfig {
    /// Convert detector values to photon counts.
    pub normalize: bool,
    /// Region cropped from every frame.
    pub roi: Roi,
    /// Clipping applied after background subtraction.
    pub threshold: Threshold,
    /// Histogram bins; derived from the data when unset.
    pub bins: Option<HistogramBins>,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            normalize: true,
            roi: Roi::full(),
            threshold: Threshold::default(),
            bins: None,
        }
    }
}

impl CorrectionConfig {
    /// Configuration that passes cropped frames through unchanged.
    #[must_use]
    pub fn raw() -> Self {
        Self {
            normalize: false,
            ..Self::default()
        }
    }

    /// Enables or disables photon-count normalization.
    #[must_use]
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Sets the region of interest.
    #[must_use]
    pub fn with_roi(mut self, roi: Roi) -> Self {
        self.roi = roi;
        self
    }

    /// Sets the threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets explicit histogram bins.
    #[must_use]
    pub fn with_bins(mut self, bins: HistogramBins) -> Self {
        self.bins = Some(bins);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_threshold_clipping() {
        let mut frame = arr2(&[[-1.0, 0.5, 2.0, 5.0]]);
        Threshold::new(Some(0.9), Some(3.0)).apply(frame.view_mut());
        assert_eq!(frame, arr2(&[[0.0, 0.0, 2.0, 0.0]]));
    }

    #[test]
    fn test_threshold_one_sided() {
        let mut frame = arr2(&[[-1.0, 0.5, 2.0, 5.0]]);
        Threshold::new(None, Some(3.0)).apply(frame.view_mut());
        assert_eq!(frame, arr2(&[[-1.0, 0.5, 2.0, 0.0]]));
        let mut frame = arr2(&[[-1.0, 0.5, 2.0, 5.0]]);
        Threshold::new(Some(0.0), None).apply(frame.view_mut());
        assert_eq!(frame, arr2(&[[0.0, 0.5, 2.0, 5.0]]));
    }

    #[test]
    fn test_roi_shape() {
        let roi = Roi::new(1..3, ..);
        assert_eq!(roi.cropped_shape(&[4, 5]).unwrap(), vec![2, 5]);
        assert!(!roi.is_full());
        assert!(Roi::full().is_full());
    }

    #[test]
    fn test_defaults() {
        let config = CorrectionConfig::default();
        assert!(config.normalize);
        assert!(config.threshold.is_unbounded());
        assert!(config.bins.is_none());
        assert!(!CorrectionConfig::raw().normalize);
    }
}
