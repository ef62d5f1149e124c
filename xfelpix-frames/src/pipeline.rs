//! Lazy per-frame correction pipeline.
//!
//! Every frame of the selection is corrected in four steps:
//!
//! 1. crop to the region of interest (only that region is read),
//! 2. multiply by the run's `tophotons` when normalization is enabled,
//! 3. subtract the background,
//! 4. zero values outside the threshold.
//!
//! Frames are read and corrected one at a time; reductions pull from the
//! same lazy sequence and accumulate in selection order.
#![allow(clippy::cast_precision_loss)]

use crate::background::{self, Background};
use crate::config::{CorrectionConfig, Roi, Threshold};
use crate::detector::{ConfigCache, DetectorConfigLookup, DetectorLayout};
use log::{debug, trace, warn};
use ndarray::{Array2, Ix2};
use std::sync::OnceLock;
use xfelpix_core::{
    DatasetSelection, Error, Histogram, HistogramBins, Result, SelectionSource, SharedStore,
    StoreOpener,
};

/// Pattern selecting detector frames in a SACLA store.
pub const DEFAULT_FRAME_PATTERN: &str = "detector_data$";

/// Correction pipeline over a selection of 2D frames.
#[derive(Clone, Debug)]
pub struct FramePipeline {
    selection: DatasetSelection,
    config: CorrectionConfig,
    background: Background,
    lookup: DetectorConfigLookup,
    derived_bins: OnceLock<HistogramBins>,
}

impl FramePipeline {
    /// Creates a pipeline with the default configuration.
    #[must_use]
    pub fn new(selection: DatasetSelection) -> Self {
        let lookup = DetectorConfigLookup::new(SharedStore::clone(selection.store()));
        Self {
            selection,
            config: CorrectionConfig::default(),
            background: Background::None,
            lookup,
            derived_bins: OnceLock::new(),
        }
    }

    /// Pipeline over every detector frame of `store`.
    ///
    /// # Errors
    /// Returns an error if the store cannot be listed.
    pub fn from_store(store: SharedStore) -> Result<Self> {
        let selection = DatasetSelection::from_store(store, DEFAULT_FRAME_PATTERN, None)?;
        Ok(Self::new(selection))
    }

    /// Pipeline over the frames of `source` matching `pattern`.
    ///
    /// # Errors
    /// Returns an error if the source cannot be resolved.
    pub fn from_source(
        source: SelectionSource,
        pattern: &str,
        opener: &dyn StoreOpener,
    ) -> Result<Self> {
        Ok(Self::new(DatasetSelection::from_source(source, pattern, opener)?))
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: CorrectionConfig) -> Self {
        self.set_config(config);
        self
    }

    /// Replaces the background.
    #[must_use]
    pub fn with_background(mut self, background: impl Into<Background>) -> Self {
        self.set_background(background);
        self
    }

    /// Selected frames.
    #[must_use]
    pub fn selection(&self) -> &DatasetSelection {
        &self.selection
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &CorrectionConfig {
        &self.config
    }

    /// Current background.
    #[must_use]
    pub fn background(&self) -> &Background {
        &self.background
    }

    /// Detector configuration lookup used for normalization.
    #[must_use]
    pub fn lookup(&self) -> &DetectorConfigLookup {
        &self.lookup
    }

    /// Number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.selection.len()
    }

    /// Returns true if there are no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selection.is_empty()
    }

    /// Replaces the configuration and forgets derived bins.
    pub fn set_config(&mut self, config: CorrectionConfig) {
        self.config = config;
        self.derived_bins = OnceLock::new();
    }

    /// Enables or disables photon-count normalization.
    pub fn set_normalize(&mut self, normalize: bool) {
        self.config.normalize = normalize;
        self.derived_bins = OnceLock::new();
    }

    /// Sets the region of interest.
    pub fn set_roi(&mut self, roi: Roi) {
        self.config.roi = roi;
        self.derived_bins = OnceLock::new();
    }

    /// Sets the background.
    pub fn set_background(&mut self, background: impl Into<Background>) {
        self.background = background.into();
        self.derived_bins = OnceLock::new();
    }

    /// Sets the clipping bounds.
    pub fn set_threshold(&mut self, lo: Option<f64>, hi: Option<f64>) {
        self.config.threshold = Threshold::new(lo, hi);
        self.derived_bins = OnceLock::new();
    }

    /// Sets explicit histogram bins.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the bins are invalid.
    pub fn set_histogram_bins(&mut self, lo: f64, hi: f64, count: usize) -> Result<()> {
        self.config.bins = Some(HistogramBins::new(lo, hi, count)?);
        Ok(())
    }

    /// Replaces the locations of the gain and photon energy nodes.
    pub fn set_layout(&mut self, layout: DetectorLayout) {
        self.lookup = self.lookup.clone().with_layout(layout);
        self.derived_bins = OnceLock::new();
    }

    /// Same configuration and background over another selection.
    pub(crate) fn with_selection(&self, selection: DatasetSelection) -> Self {
        Self {
            selection,
            config: self.config.clone(),
            background: self.background.clone(),
            lookup: self.lookup.clone(),
            derived_bins: self.derived_bins.clone(),
        }
    }

    /// Lazily corrected frames from position `start` on.
    ///
    /// A pipeline background is advanced in lockstep from the same `start`.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if a background pipeline has a
    /// different number of frames.
    pub fn generate(&self, start: usize) -> Result<Frames<'_>> {
        let background = match &self.background {
            Background::Pipeline(pipeline) => {
                if pipeline.len() != self.len() {
                    return Err(Error::LengthMismatch {
                        what: "background frames",
                        expected: self.len(),
                        actual: pipeline.len(),
                    });
                }
                Some(Box::new(pipeline.generate(start)?))
            }
            _ => None,
        };
        Ok(Frames {
            pipeline: self,
            position: start.min(self.len()),
            cache: ConfigCache::new(&self.lookup),
            background,
        })
    }

    fn correct(
        &self,
        path: &str,
        cache: &mut ConfigCache<'_>,
        background_frame: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        let store = self.selection.store();
        let raw_shape = store.shape(path)?;
        if raw_shape.len() != 2 {
            return Err(Error::InvalidSource(format!(
                "{path} has shape {raw_shape:?}, expected a 2D frame"
            )));
        }
        let roi = &self.config.roi;
        let mut frame = store
            .read_array(path, &roi.to_slice())?
            .into_dimensionality::<Ix2>()
            .map_err(|e| Error::Store(format!("{path}: {e}")))?;

        if self.config.normalize {
            frame *= cache.get(path)?.tophotons;
        }

        match &self.background {
            Background::None => {}
            Background::Constant(value) => {
                if *value != 0.0 {
                    frame -= *value;
                }
            }
            Background::Fixed(image) => {
                let view = Background::fixed_view(image, &raw_shape, roi)?;
                background::subtract(&mut frame, view)?;
            }
            Background::Pipeline(_) => {
                let image = background_frame.ok_or(Error::LengthMismatch {
                    what: "background frames",
                    expected: self.len(),
                    actual: 0,
                })?;
                background::subtract(&mut frame, image.view())?;
            }
        }

        self.config.threshold.apply(frame.view_mut());
        trace!("corrected {path}: shape {:?}", frame.shape());
        Ok(frame)
    }

    /// Elementwise sum of all corrected frames, in selection order.
    ///
    /// # Errors
    /// Returns [`Error::EmptySelection`] without frames and
    /// [`Error::ShapeMismatch`] if corrected frames differ in shape.
    pub fn sum(&self) -> Result<Array2<f64>> {
        let mut frames = self.generate(0)?;
        let mut total = frames.next().ok_or(Error::EmptySelection)??;
        for frame in frames {
            let frame = frame?;
            if frame.shape() != total.shape() {
                return Err(Error::shape_mismatch(total.shape(), frame.shape()));
            }
            total += &frame;
        }
        Ok(total)
    }

    /// Mean of all corrected frames.
    ///
    /// # Errors
    /// Same as [`FramePipeline::sum`].
    pub fn mean(&self) -> Result<Array2<f64>> {
        let sum = self.sum()?;
        Ok(sum / self.len().max(1) as f64)
    }

    /// Sum of every pixel of every corrected frame; `0.0` without frames.
    ///
    /// # Errors
    /// Returns an error if a frame cannot be corrected.
    pub fn total(&self) -> Result<f64> {
        self.per_frame_total().map(|totals| totals.iter().sum())
    }

    /// Pixel sum of every corrected frame.
    ///
    /// # Errors
    /// Returns an error if a frame cannot be corrected.
    pub fn per_frame_total(&self) -> Result<Vec<f64>> {
        self.per_frame(|frame| frame.sum())
    }

    /// Smallest pixel of every corrected frame.
    ///
    /// # Errors
    /// Returns an error if a frame cannot be corrected.
    pub fn per_frame_min(&self) -> Result<Vec<f64>> {
        self.per_frame(|frame| frame.iter().copied().fold(f64::INFINITY, f64::min))
    }

    /// Largest pixel of every corrected frame.
    ///
    /// # Errors
    /// Returns an error if a frame cannot be corrected.
    pub fn per_frame_max(&self) -> Result<Vec<f64>> {
        self.per_frame(|frame| frame.iter().copied().fold(f64::NEG_INFINITY, f64::max))
    }

    fn per_frame<F>(&self, f: F) -> Result<Vec<f64>>
    where
        F: Fn(&Array2<f64>) -> f64,
    {
        self.generate(0)?.map(|frame| frame.map(|f0| f(&f0))).collect()
    }

    /// Histogram bins in use.
    ///
    /// Explicit bins win. Otherwise the bins span the smallest and largest
    /// corrected pixel over all frames with
    /// [`HistogramBins::DEFAULT_COUNT`] bins; they are computed on first use
    /// and kept until the configuration changes.
    ///
    /// # Errors
    /// Returns [`Error::EmptySelection`] if bins must be derived without
    /// frames, or an error if a frame cannot be corrected.
    pub fn histogram_bins(&self) -> Result<HistogramBins> {
        if let Some(bins) = self.config.bins {
            return Ok(bins);
        }
        if let Some(bins) = self.derived_bins.get() {
            return Ok(*bins);
        }
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for frame in self.generate(0)? {
            for &value in &frame? {
                lo = lo.min(value);
                hi = hi.max(value);
            }
        }
        if lo > hi {
            return Err(Error::EmptySelection);
        }
        if lo == hi {
            warn!("all corrected pixels equal {lo}; histogram range is degenerate");
        }
        let bins = HistogramBins::new(lo, hi, HistogramBins::DEFAULT_COUNT)?;
        debug!("derived histogram bins [{lo}, {hi}] x {}", bins.count);
        Ok(*self.derived_bins.get_or_init(|| bins))
    }

    /// Histogram of every corrected frame over shared bins.
    ///
    /// # Errors
    /// Returns an error if the bins cannot be determined or a frame cannot
    /// be corrected.
    pub fn histogram_per_frame(&self) -> Result<FrameHistograms> {
        let bins = self.histogram_bins()?;
        let counts = self
            .generate(0)?
            .map(|frame| {
                let frame = frame?;
                let mut histogram = Histogram::new(&bins);
                histogram.fill(frame.iter().copied());
                Ok(histogram.counts)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(FrameHistograms {
            counts,
            edges: bins.edges(),
        })
    }

    /// Histogram of all corrected pixels.
    ///
    /// # Errors
    /// Same as [`FramePipeline::histogram_per_frame`].
    pub fn histogram(&self) -> Result<Histogram> {
        let bins = self.histogram_bins()?;
        let mut histogram = Histogram::new(&bins);
        for frame in self.generate(0)? {
            histogram.fill(frame?.iter().copied());
        }
        Ok(histogram)
    }
}

/// One count vector per frame over shared bin edges.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameHistograms {
    /// Counts of every frame, in selection order.
    pub counts: Vec<Vec<u64>>,
    /// Bin edges shared by all frames.
    pub edges: Vec<f64>,
}

impl FrameHistograms {
    /// Sum of the per-frame counts.
    #[must_use]
    pub fn summed(&self) -> Vec<u64> {
        let mut total = vec![0; self.edges.len().saturating_sub(1)];
        for counts in &self.counts {
            for (t, c) in total.iter_mut().zip(counts) {
                *t += c;
            }
        }
        total
    }
}

/// Lazy sequence of corrected frames returned by [`FramePipeline::generate`].
///
/// Iteration stops after the first error.
pub struct Frames<'a> {
    pipeline: &'a FramePipeline,
    position: usize,
    cache: ConfigCache<'a>,
    background: Option<Box<Frames<'a>>>,
}

impl Frames<'_> {
    /// Position of the next frame in the selection.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    fn advance(&mut self) -> Option<Result<Array2<f64>>> {
        let pipeline = self.pipeline;
        let path = pipeline.selection.names().get(self.position)?;
        self.position += 1;
        let background = match self.background.as_mut().map(|frames| frames.next()) {
            None => None,
            Some(Some(Ok(frame))) => Some(frame),
            Some(Some(Err(e))) => return Some(Err(e)),
            Some(None) => {
                return Some(Err(Error::LengthMismatch {
                    what: "background frames",
                    expected: pipeline.len(),
                    actual: self.position - 1,
                }))
            }
        };
        Some(pipeline.correct(path, &mut self.cache, background.as_ref()))
    }
}

impl Iterator for Frames<'_> {
    type Item = Result<Array2<f64>>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.advance()?;
        if item.is_err() {
            self.position = self.pipeline.len();
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.pipeline.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Frames<'_> {}
