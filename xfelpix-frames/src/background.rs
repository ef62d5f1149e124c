//! Background subtracted from every corrected frame.

use crate::config::Roi;
use crate::pipeline::FramePipeline;
use ndarray::{Array2, ArrayView2};
use xfelpix_core::{Error, Result};

/// Background variants.
///
/// A pipeline background is owned by the pipeline it corrects, so a
/// pipeline can never be its own background. Wrapping a clone of a
/// pipeline is the way to subtract a snapshot of the same selection.
#[derive(Clone, Debug, Default)]
pub enum Background {
    /// Nothing is subtracted.
    #[default]
    None,
    /// A constant subtracted from every pixel.
    Constant(f64),
    /// A fixed image, either of raw frame shape or broadcastable to the
    /// cropped frame.
    Fixed(Array2<f64>),
    /// Per-frame backgrounds generated in lockstep with the foreground.
    Pipeline(Box<FramePipeline>),
}

impl Background {
    /// Returns true if nothing is subtracted.
    #[must_use]
    pub fn is_none(&self) -> bool {
        match self {
            Self::None => true,
            Self::Constant(value) => *value == 0.0,
            Self::Fixed(_) | Self::Pipeline(_) => false,
        }
    }

    /// The background pipeline, if any.
    #[must_use]
    pub fn as_pipeline(&self) -> Option<&FramePipeline> {
        match self {
            Self::Pipeline(pipeline) => Some(pipeline),
            _ => None,
        }
    }

    /// Fixed background aligned to a frame cropped from `raw_shape`.
    ///
    /// An image of the raw frame shape is cropped with `roi`; any other
    /// image is used as is.
    pub(crate) fn fixed_view<'a>(
        image: &'a Array2<f64>,
        raw_shape: &[usize],
        roi: &Roi,
    ) -> Result<ArrayView2<'a, f64>> {
        if image.shape() == raw_shape && !roi.is_full() {
            roi.to_slice().apply(image.view())
        } else {
            Ok(image.view())
        }
    }
}

impl From<f64> for Background {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl From<Array2<f64>> for Background {
    fn from(image: Array2<f64>) -> Self {
        Self::Fixed(image)
    }
}

impl From<FramePipeline> for Background {
    fn from(pipeline: FramePipeline) -> Self {
        Self::Pipeline(Box::new(pipeline))
    }
}

/// Subtracts `background` from `frame`, broadcasting it when needed.
///
/// # Errors
/// Returns [`Error::ShapeMismatch`] if the background does not broadcast to
/// the frame shape.
pub(crate) fn subtract(frame: &mut Array2<f64>, background: ArrayView2<'_, f64>) -> Result<()> {
    let Some(aligned) = background.broadcast(frame.raw_dim()) else {
        return Err(Error::shape_mismatch(frame.shape(), background.shape()));
    };
    *frame -= &aligned;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_fixed_view_crops_raw_shape() {
        let image = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let roi = Roi::new(1..2, 1..3);
        let view = Background::fixed_view(&image, &[2, 3], &roi).unwrap();
        assert_eq!(view, arr2(&[[5.0, 6.0]]));
        let as_is = Background::fixed_view(&image, &[4, 4], &roi).unwrap();
        assert_eq!(as_is.shape(), &[2, 3]);
    }

    #[test]
    fn test_subtract_broadcasts() {
        let mut frame = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        subtract(&mut frame, arr2(&[[1.0, 2.0]]).view()).unwrap();
        assert_eq!(frame, arr2(&[[0.0, 0.0], [2.0, 2.0]]));
    }

    #[test]
    fn test_subtract_shape_mismatch() {
        let mut frame = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let result = subtract(&mut frame, arr2(&[[1.0, 2.0, 3.0]]).view());
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_is_none() {
        assert!(Background::default().is_none());
        assert!(Background::from(0.0).is_none());
        assert!(!Background::from(1.5).is_none());
        assert!(Background::from(1.5).as_pipeline().is_none());
    }
}
