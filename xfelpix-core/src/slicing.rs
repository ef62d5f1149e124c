//! Python-style slices over selections and array axes.
//!
//! A [`SliceSpec`] behaves like `start:stop:step`: negative positions count
//! from the end, out-of-range bounds are clamped and a negative step walks
//! backwards. [`ArraySlice`] applies one spec per leading array axis.
#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use crate::{Error, Result};
use ndarray::{ArrayView, Axis, Dimension, Slice};
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One `start:stop:step` slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SliceSpec {
    /// First position, `None` for the natural start.
    pub start: Option<isize>,
    /// Position one past the last, `None` for the natural end.
    pub stop: Option<isize>,
    /// Stride, never zero.
    pub step: isize,
}

impl Default for SliceSpec {
    fn default() -> Self {
        Self::full()
    }
}

impl SliceSpec {
    /// The `:` slice covering everything.
    #[must_use]
    pub fn full() -> Self {
        Self {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// Creates a slice from explicit parts.
    #[must_use]
    pub fn new(start: Option<isize>, stop: Option<isize>, step: isize) -> Self {
        Self { start, stop, step }
    }

    /// Sets the step.
    #[must_use]
    pub fn with_step(mut self, step: isize) -> Self {
        self.step = step;
        self
    }

    /// Returns true if this slice selects everything in its natural order.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.stop.is_none() && self.step == 1
    }

    /// Resolves the slice against a sequence of `len` items.
    ///
    /// Returns normalized `(start, stop, step)` with the same meaning as
    /// Python's `slice.indices`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the step is zero.
    pub fn resolve(&self, len: usize) -> Result<(isize, isize, isize)> {
        if self.step == 0 {
            return Err(Error::InvalidConfig("slice step cannot be zero".into()));
        }
        let len = len as isize;
        let (lower, upper) = if self.step > 0 {
            (0, len)
        } else {
            (-1, len - 1)
        };
        let clamp = |value: isize| {
            if value < 0 {
                (value + len).max(lower)
            } else {
                value.min(upper)
            }
        };
        let (default_start, default_stop) = if self.step > 0 {
            (lower, upper)
        } else {
            (upper, lower)
        };
        let start = self.start.map_or(default_start, clamp);
        let stop = self.stop.map_or(default_stop, clamp);
        Ok((start, stop, self.step))
    }

    /// Number of items the slice selects from `len` items.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the step is zero.
    pub fn count(&self, len: usize) -> Result<usize> {
        let (start, stop, step) = self.resolve(len)?;
        let count = if step > 0 && stop > start {
            (stop - start - 1).unsigned_abs() / step.unsigned_abs() + 1
        } else if step < 0 && start > stop {
            (start - stop - 1).unsigned_abs() / step.unsigned_abs() + 1
        } else {
            0
        };
        Ok(count)
    }

    /// Positions the slice selects from `len` items, in slice order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the step is zero.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>> {
        let (start, _, step) = self.resolve(len)?;
        let count = self.count(len)?;
        Ok((0..count as isize)
            .map(|i| (start + i * step) as usize)
            .collect())
    }

    /// Converts to an `ndarray` slice over an axis of length `len`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the step is zero.
    pub fn to_axis_slice(&self, len: usize) -> Result<Slice> {
        let (start, stop, step) = self.resolve(len)?;
        let slice = if step > 0 {
            Slice::new(start, Some(stop.max(start)), step)
        } else if start > stop {
            // ndarray walks a negative step from the end of the range
            Slice::new(stop + 1, Some(start + 1), step)
        } else {
            Slice::new(0, Some(0), 1)
        };
        Ok(slice)
    }
}

impl From<RangeFull> for SliceSpec {
    fn from(_: RangeFull) -> Self {
        Self::full()
    }
}

impl From<Range<isize>> for SliceSpec {
    fn from(range: Range<isize>) -> Self {
        Self::new(Some(range.start), Some(range.end), 1)
    }
}

impl From<RangeFrom<isize>> for SliceSpec {
    fn from(range: RangeFrom<isize>) -> Self {
        Self::new(Some(range.start), None, 1)
    }
}

impl From<RangeTo<isize>> for SliceSpec {
    fn from(range: RangeTo<isize>) -> Self {
        Self::new(None, Some(range.end), 1)
    }
}

/// Sub-array selection: one [`SliceSpec`] per leading axis.
///
/// Axes without a spec are taken in full.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArraySlice {
    axes: Vec<SliceSpec>,
}

impl ArraySlice {
    /// The slice that selects the whole array.
    #[must_use]
    pub fn full() -> Self {
        Self::default()
    }

    /// Creates a slice from per-axis specs.
    #[must_use]
    pub fn new(axes: Vec<SliceSpec>) -> Self {
        Self { axes }
    }

    /// Per-axis specs.
    #[must_use]
    pub fn axes(&self) -> &[SliceSpec] {
        &self.axes
    }

    /// Returns true if the slice selects the whole array unchanged.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.axes.iter().all(SliceSpec::is_full)
    }

    /// Shape of the result of slicing an array of `shape`.
    ///
    /// # Errors
    /// Returns an error if there are more specs than axes or a step is zero.
    pub fn sliced_shape(&self, shape: &[usize]) -> Result<Vec<usize>> {
        self.check_rank(shape.len())?;
        shape
            .iter()
            .enumerate()
            .map(|(axis, &len)| match self.axes.get(axis) {
                Some(spec) => spec.count(len),
                None => Ok(len),
            })
            .collect()
    }

    /// Applies the slice to an array view.
    ///
    /// # Errors
    /// Returns an error if there are more specs than axes or a step is zero.
    pub fn apply<'a, A, D: Dimension>(
        &self,
        mut view: ArrayView<'a, A, D>,
    ) -> Result<ArrayView<'a, A, D>> {
        self.check_rank(view.ndim())?;
        for (axis, spec) in self.axes.iter().enumerate() {
            if spec.is_full() {
                continue;
            }
            let len = view.len_of(Axis(axis));
            view.slice_axis_inplace(Axis(axis), spec.to_axis_slice(len)?);
        }
        Ok(view)
    }

    fn check_rank(&self, ndim: usize) -> Result<()> {
        if self.axes.len() > ndim {
            return Err(Error::InvalidConfig(format!(
                "slice has {} axes but the array has {ndim}",
                self.axes.len()
            )));
        }
        Ok(())
    }
}

impl From<Vec<SliceSpec>> for ArraySlice {
    fn from(axes: Vec<SliceSpec>) -> Self {
        Self::new(axes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn test_python_indices() {
        assert_eq!(SliceSpec::full().indices(4).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(SliceSpec::from(1..3).indices(4).unwrap(), vec![1, 2]);
        assert_eq!(SliceSpec::from(-2..).indices(4).unwrap(), vec![2, 3]);
        assert_eq!(SliceSpec::from(..-1).indices(4).unwrap(), vec![0, 1, 2]);
        assert_eq!(SliceSpec::from(2..100).indices(4).unwrap(), vec![2, 3]);
        assert_eq!(SliceSpec::from(3..1).indices(4).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_negative_step() {
        let rev = SliceSpec::full().with_step(-1);
        assert_eq!(rev.indices(4).unwrap(), vec![3, 2, 1, 0]);
        let spec = SliceSpec::new(Some(3), Some(0), -2);
        assert_eq!(spec.indices(5).unwrap(), vec![3, 1]);
        assert_eq!(SliceSpec::full().with_step(-1).indices(0).unwrap().len(), 0);
    }

    #[test]
    fn test_extreme_steps() {
        let first = SliceSpec::full().with_step(isize::MAX);
        assert_eq!(first.count(5).unwrap(), 1);
        assert_eq!(first.indices(5).unwrap(), vec![0]);
        let last = SliceSpec::full().with_step(isize::MIN);
        assert_eq!(last.count(5).unwrap(), 1);
        assert_eq!(last.indices(5).unwrap(), vec![4]);
        assert_eq!(SliceSpec::new(Some(1), None, isize::MAX).indices(5).unwrap(), vec![1]);
        assert!(last.indices(0).unwrap().is_empty());
    }

    #[test]
    fn test_zero_step_rejected() {
        let spec = SliceSpec::full().with_step(0);
        assert!(matches!(spec.indices(3), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_axis_slice_matches_indices() {
        let a = arr1(&[0, 1, 2, 3, 4, 5]);
        for spec in [
            SliceSpec::new(Some(4), Some(0), -2),
            SliceSpec::new(None, None, -3),
            SliceSpec::new(Some(1), None, 2),
            SliceSpec::new(Some(-1), Some(-4), -1),
        ] {
            let sliced = ArraySlice::new(vec![spec]).apply(a.view()).unwrap();
            let expected: Vec<i32> = spec
                .indices(6)
                .unwrap()
                .into_iter()
                .map(|i| a[i])
                .collect();
            assert_eq!(sliced.to_vec(), expected, "{spec:?}");
        }
    }

    #[test]
    fn test_array_slice_2d() {
        let a = arr2(&[[1, 2, 3], [4, 5, 6], [7, 8, 9]]);
        let slice = ArraySlice::new(vec![SliceSpec::from(1..), SliceSpec::from(..2)]);
        let view = slice.apply(a.view()).unwrap();
        assert_eq!(view, arr2(&[[4, 5], [7, 8]]));
        assert_eq!(slice.sliced_shape(&[3, 3]).unwrap(), vec![2, 2]);
        assert!(!slice.is_full());
        assert!(ArraySlice::full().is_full());
    }

    #[test]
    fn test_too_many_axes() {
        let a = arr1(&[1.0, 2.0]);
        let slice = ArraySlice::new(vec![SliceSpec::full(), SliceSpec::full()]);
        assert!(slice.apply(a.view()).is_err());
    }
}
