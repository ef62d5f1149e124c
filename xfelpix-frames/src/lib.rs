//! xfelpix-frames: detector frame corrections and reductions.
//!
//! This crate turns a selection of per-shot detector images into corrected
//! frames and summary statistics:
//! - **Detector configuration** - per-run gain and photon energy lookup
//! - **Correction pipeline** - ROI crop, photon-count normalization,
//!   background subtraction and threshold clipping, one frame at a time
//! - **Reductions** - sum, mean, totals, histograms and compression by key
//!
#![warn(missing_docs)]

mod background;
mod config;
pub mod detector;
mod pipeline;
mod reduce;

pub use background::Background;
pub use config::{CorrectionConfig, Roi, Threshold};
pub use detector::{
    run_number_of, DetectorConfig, DetectorConfigLookup, DetectorLayout, SILICON_GAP_EV,
};
pub use pipeline::{FrameHistograms, FramePipeline, Frames, DEFAULT_FRAME_PATTERN};
pub use reduce::{BackgroundMap, CompressedFrames, ReduceFn, Reducer};

// Re-export the core types every pipeline user needs
pub use xfelpix_core::{DatasetSelection, Error, HistogramBins, Result, SliceSpec};
