//! Grouping of frames by key and per-group reduction.

use crate::background::Background;
use crate::pipeline::FramePipeline;
use log::debug;
use ndarray::{arr0, stack, ArrayD, ArrayViewD, Axis, IxDyn};
use std::fmt;
use xfelpix_core::{Error, Result};

/// Caller-supplied reduction of one group.
pub type ReduceFn = dyn Fn(&FramePipeline) -> Result<ArrayD<f64>> + Send + Sync;

/// Reduction applied to every group of frames.
pub enum Reducer {
    /// [`FramePipeline::mean`].
    Mean,
    /// [`FramePipeline::sum`].
    Sum,
    /// [`FramePipeline::total`], one scalar per group.
    Total,
    /// Any function of a group's pipeline.
    Custom(Box<ReduceFn>),
}

impl Reducer {
    /// Wraps a custom reduction.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&FramePipeline) -> Result<ArrayD<f64>> + Send + Sync + 'static,
    {
        Self::Custom(Box::new(f))
    }

    /// Reduces the frames of `pipeline`.
    ///
    /// # Errors
    /// Propagates errors of the reduction.
    pub fn apply(&self, pipeline: &FramePipeline) -> Result<ArrayD<f64>> {
        match self {
            Self::Mean => pipeline.mean().map(|mean| mean.into_dyn()),
            Self::Sum => pipeline.sum().map(|sum| sum.into_dyn()),
            Self::Total => pipeline.total().map(|total| arr0(total).into_dyn()),
            Self::Custom(f) => f(pipeline),
        }
    }
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mean => f.write_str("Mean"),
            Self::Sum => f.write_str("Sum"),
            Self::Total => f.write_str("Total"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Background per group key.
#[derive(Clone, Debug)]
pub struct BackgroundMap<K> {
    entries: Vec<(K, Background)>,
}

impl<K> Default for BackgroundMap<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: PartialEq> BackgroundMap<K> {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the background of `key`, replacing any previous one.
    pub fn insert(&mut self, key: K, background: impl Into<Background>) -> &mut Self {
        let background = background.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = background,
            None => self.entries.push((key, background)),
        }
        self
    }

    /// Background of `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&Background> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, bg)| bg)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no key has a background.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: PartialEq> FromIterator<(K, Background)> for BackgroundMap<K> {
    fn from_iter<I: IntoIterator<Item = (K, Background)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, background) in iter {
            map.insert(key, background);
        }
        map
    }
}

/// Distinct keys in order of first appearance with one stacked result each.
#[derive(Clone, Debug, PartialEq)]
pub struct CompressedFrames<K> {
    /// Group keys.
    pub keys: Vec<K>,
    /// Per-group results stacked along axis 0.
    pub data: ArrayD<f64>,
}

impl<K> CompressedFrames<K> {
    /// Number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if there are no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Result of group `index`.
    #[must_use]
    pub fn group(&self, index: usize) -> Option<ArrayViewD<'_, f64>> {
        (index < self.len()).then(|| self.data.index_axis(Axis(0), index))
    }
}

impl FramePipeline {
    /// Splits the pipeline into one pipeline per distinct key.
    ///
    /// Groups follow the first appearance of each key. A pipeline background
    /// of the same length is split at the same positions.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if `keys` or a background pipeline
    /// differ in length from the frames.
    pub fn group_by_keys<K: PartialEq + Clone>(
        &self,
        keys: &[K],
    ) -> Result<Vec<(K, FramePipeline)>> {
        self.group_by_keys_with(keys, true)
    }

    fn group_by_keys_with<K: PartialEq + Clone>(
        &self,
        keys: &[K],
        split_background: bool,
    ) -> Result<Vec<(K, FramePipeline)>> {
        let groups = self.selection().group_by_keys(keys)?;
        let backgrounds = match self.background() {
            Background::Pipeline(background) if split_background => {
                if background.len() != self.len() {
                    return Err(Error::LengthMismatch {
                        what: "background frames",
                        expected: self.len(),
                        actual: background.len(),
                    });
                }
                let split = background.selection().group_by(keys)?;
                Some((background, split))
            }
            _ => None,
        };

        Ok(groups
            .into_iter()
            .enumerate()
            .map(|(i, (key, selection))| {
                let mut group = self.with_selection(selection);
                if let Some((background, split)) = &backgrounds {
                    group.set_background(background.with_selection(split[i].clone()));
                }
                (key, group)
            })
            .collect())
    }

    /// Groups frames by `keys` and reduces every group.
    ///
    /// With `backgrounds`, each group uses the background stored for its key
    /// instead of the pipeline's own.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if `keys` has the wrong length,
    /// [`Error::InvalidConfig`] if a key has no background in `backgrounds`,
    /// [`Error::ShapeMismatch`] if group results differ in shape, or any
    /// error of the reduction.
    pub fn compress_by_key<K: PartialEq + Clone>(
        &self,
        keys: &[K],
        reducer: &Reducer,
        backgrounds: Option<&BackgroundMap<K>>,
    ) -> Result<CompressedFrames<K>> {
        // the map replaces the pipeline's own background in every group
        let groups = self.group_by_keys_with(keys, backgrounds.is_none())?;
        let mut unique = Vec::with_capacity(groups.len());
        let mut results = Vec::with_capacity(groups.len());
        for (i, (key, mut group)) in groups.into_iter().enumerate() {
            if let Some(map) = backgrounds {
                let background = map.get(&key).ok_or_else(|| {
                    Error::InvalidConfig(format!("no background for group {i}"))
                })?;
                group.set_background(background.clone());
            }
            debug!("reducing group {i} with {} frames", group.len());
            results.push(reducer.apply(&group)?);
            unique.push(key);
        }
        Ok(CompressedFrames {
            keys: unique,
            data: stack_results(&results)?,
        })
    }
}

fn stack_results(results: &[ArrayD<f64>]) -> Result<ArrayD<f64>> {
    let Some(first) = results.first() else {
        return Ok(ArrayD::zeros(IxDyn(&[0])));
    };
    if let Some(other) = results.iter().find(|r| r.shape() != first.shape()) {
        return Err(Error::shape_mismatch(first.shape(), other.shape()));
    }
    let views: Vec<_> = results.iter().map(|r| r.view()).collect();
    stack(Axis(0), &views).map_err(|e| Error::InvalidConfig(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorrectionConfig;
    use approx::assert_relative_eq;
    use ndarray::{arr1, Array2};
    use xfelpix_core::{DatasetSelection, MemoryStore};

    fn pipeline(values: &[f64]) -> FramePipeline {
        let mut store = MemoryStore::new("keys");
        for (i, value) in values.iter().enumerate() {
            store.insert(&format!("/frames/f{i}"), Array2::from_elem((2, 2), *value));
        }
        let selection = DatasetSelection::from_store(store.into_shared(), "", None).unwrap();
        FramePipeline::new(selection).with_config(CorrectionConfig::raw())
    }

    #[test]
    fn test_compress_sum() {
        let p = pipeline(&[1.0, 2.0, 3.0, 4.0]);
        let compressed = p
            .compress_by_key(&["a", "b", "a", "b"], &Reducer::Sum, None)
            .unwrap();
        assert_eq!(compressed.keys, vec!["a", "b"]);
        assert_eq!(compressed.data.shape(), &[2, 2, 2]);
        assert!(compressed.group(0).unwrap().iter().all(|&v| v == 4.0));
        assert!(compressed.group(1).unwrap().iter().all(|&v| v == 6.0));
        assert!(compressed.group(2).is_none());
    }

    #[test]
    fn test_compress_total_and_custom() {
        let p = pipeline(&[1.0, 2.0, 3.0]);
        let totals = p.compress_by_key(&[7, 7, 8], &Reducer::Total, None).unwrap();
        assert_eq!(totals.data, arr1(&[12.0, 12.0]).into_dyn());

        let counts = Reducer::custom(|group| Ok(arr1(&[group.len() as f64]).into_dyn()));
        let result = p.compress_by_key(&[7, 7, 8], &counts, None).unwrap();
        assert_eq!(result.data.shape(), &[2, 1]);
        assert_relative_eq!(result.data[[0, 0]], 2.0);
        assert_relative_eq!(result.data[[1, 0]], 1.0);
    }

    #[test]
    fn test_compress_key_length() {
        let p = pipeline(&[1.0, 2.0]);
        assert!(matches!(
            p.compress_by_key(&[1, 2, 3], &Reducer::Mean, None),
            Err(Error::LengthMismatch { expected: 2, actual: 3, .. })
        ));
    }

    #[test]
    fn test_background_map() {
        let p = pipeline(&[1.0, 2.0, 3.0, 4.0]);
        let mut map = BackgroundMap::new();
        map.insert("a", 1.0).insert("b", Array2::from_elem((2, 2), 2.0));
        let compressed = p
            .compress_by_key(&["a", "b", "a", "b"], &Reducer::Mean, Some(&map))
            .unwrap();
        assert!(compressed.group(0).unwrap().iter().all(|&v| v == 1.0));
        assert!(compressed.group(1).unwrap().iter().all(|&v| v == 1.0));

        let partial: BackgroundMap<&str> = [("a", Background::from(1.0))].into_iter().collect();
        assert!(matches!(
            p.compress_by_key(&["a", "b", "a", "b"], &Reducer::Mean, Some(&partial)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_background_map_overrides_pipeline_background() {
        let short_dark = pipeline(&[5.0, 5.0]);
        let p = pipeline(&[1.0, 2.0, 3.0, 4.0]).with_background(short_dark);
        assert!(matches!(
            p.compress_by_key(&["a", "b", "a", "b"], &Reducer::Sum, None),
            Err(Error::LengthMismatch { expected: 4, actual: 2, .. })
        ));

        let map: BackgroundMap<&str> = [("a", Background::from(0.0)), ("b", Background::from(1.0))]
            .into_iter()
            .collect();
        let compressed = p
            .compress_by_key(&["a", "b", "a", "b"], &Reducer::Sum, Some(&map))
            .unwrap();
        assert!(compressed.group(0).unwrap().iter().all(|&v| v == 4.0));
        assert!(compressed.group(1).unwrap().iter().all(|&v| v == 4.0));
    }

    #[test]
    fn test_background_pipeline_split_per_group() {
        let foreground = pipeline(&[1.0, 2.0, 3.0, 4.0]);
        let background = pipeline(&[1.0, 1.0, 2.0, 2.0]);
        let p = foreground.with_background(background);
        let groups = p.group_by_keys(&[0, 1, 0, 1]).unwrap();
        assert_eq!(groups.len(), 2);
        let (_, first) = &groups[0];
        assert_eq!(first.len(), 2);
        assert_eq!(first.background().as_pipeline().unwrap().len(), 2);
        assert_eq!(first.per_frame_total().unwrap(), vec![0.0, 4.0]);
        let (_, second) = &groups[1];
        assert_eq!(second.per_frame_total().unwrap(), vec![4.0, 8.0]);
    }

    #[test]
    fn test_compress_empty() {
        let p = pipeline(&[]);
        let keys: [u8; 0] = [];
        let compressed = p.compress_by_key(&keys, &Reducer::Sum, None).unwrap();
        assert!(compressed.is_empty());
        assert_eq!(compressed.data.shape(), &[0]);
    }
}
