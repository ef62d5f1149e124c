//! Ordered selections of datasets within one store.
//!
//! A [`DatasetSelection`] keeps a shared reference to its store and a
//! strictly increasing list of dataset paths. Every constructor sorts and
//! deduplicates; [`DatasetSelection::difference`] and grouping keep the
//! relative order of the source, which is already sorted, so the invariant
//! holds for every selection.

use crate::keys::KeyGroups;
use crate::pattern::PatternSet;
use crate::slicing::{ArraySlice, SliceSpec};
use crate::store::{normalize_path, same_store, OpenMode, SharedStore, StoreOpener};
use crate::{Error, Result};
use log::debug;
use ndarray::ArrayD;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Reference to one dataset in a store.
#[derive(Clone)]
pub struct DatasetHandle {
    store: SharedStore,
    path: String,
}

impl DatasetHandle {
    /// Creates a handle; the path is normalized but not checked.
    #[must_use]
    pub fn new(store: SharedStore, path: &str) -> Self {
        Self {
            store,
            path: normalize_path(path),
        }
    }

    /// Absolute dataset path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Path of the enclosing group.
    #[must_use]
    pub fn parent(&self) -> &str {
        match self.path.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &self.path[..idx],
        }
    }

    /// Store the dataset lives in.
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Dataset shape.
    ///
    /// # Errors
    /// Returns an error if the store cannot resolve the dataset.
    pub fn shape(&self) -> Result<Vec<usize>> {
        self.store.shape(&self.path)
    }

    /// Reads the whole dataset.
    ///
    /// # Errors
    /// Returns an error if the store read fails.
    pub fn read(&self) -> Result<ArrayD<f64>> {
        self.store.read_array(&self.path, &ArraySlice::full())
    }

    /// Reads a sub-array.
    ///
    /// # Errors
    /// Returns an error if the slice does not fit or the store read fails.
    pub fn read_slice(&self, slice: &ArraySlice) -> Result<ArrayD<f64>> {
        self.store.read_array(&self.path, slice)
    }

    /// Reads the first value of the dataset.
    ///
    /// # Errors
    /// Returns an error if the store read fails or the dataset is empty.
    pub fn read_scalar(&self) -> Result<f64> {
        self.store.read_scalar(&self.path)
    }
}

impl PartialEq for DatasetHandle {
    fn eq(&self, other: &Self) -> bool {
        same_store(&self.store, &other.store) && self.path == other.path
    }
}

impl Eq for DatasetHandle {}

impl fmt::Debug for DatasetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetHandle")
            .field("store", &self.store.name())
            .field("path", &self.path)
            .finish()
    }
}

impl fmt::Display for DatasetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.store.name(), self.path)
    }
}

/// Where a selection draws its datasets from.
pub enum SelectionSource {
    /// A store file to open read-only.
    Path(PathBuf),
    /// Every dataset of an open store.
    Store(SharedStore),
    /// Datasets below one group of an open store.
    Subtree { store: SharedStore, root: String },
    /// The datasets of an existing selection.
    Selection(DatasetSelection),
}

/// Sorted, duplicate-free selection of datasets from one store.
#[derive(Clone)]
pub struct DatasetSelection {
    store: SharedStore,
    paths: Vec<String>,
}

impl DatasetSelection {
    /// Selects the datasets of `store` (or of its `subtree`) matching `pattern`.
    ///
    /// # Errors
    /// Returns an error if the pattern is malformed or the subtree is not a group.
    pub fn from_store(store: SharedStore, pattern: &str, subtree: Option<&str>) -> Result<Self> {
        let patterns = PatternSet::parse(pattern)?;
        let mut all = store.list_dataset_paths(subtree)?;
        let total = all.len();
        all.retain(|p| patterns.is_match(p));
        debug!(
            "selected {} of {} datasets from {} matching {:?}",
            all.len(),
            total,
            store.name(),
            pattern
        );
        Ok(Self::from_unsorted(store, all))
    }

    /// Resolves any [`SelectionSource`] and filters it by `pattern`.
    ///
    /// # Errors
    /// Returns an error if the source cannot be opened or listed, or the
    /// pattern is malformed.
    pub fn from_source(
        source: SelectionSource,
        pattern: &str,
        opener: &dyn StoreOpener,
    ) -> Result<Self> {
        match source {
            SelectionSource::Path(path) => {
                let store = opener.open(&path, OpenMode::Read)?;
                Self::from_store(store, pattern, None)
            }
            SelectionSource::Store(store) => Self::from_store(store, pattern, None),
            SelectionSource::Subtree { store, root } => {
                Self::from_store(store, pattern, Some(&root))
            }
            SelectionSource::Selection(selection) => selection.filter(pattern),
        }
    }

    /// Selects explicit dataset paths.
    ///
    /// # Errors
    /// Returns [`Error::InvalidSource`] if a path is not a dataset of `store`.
    pub fn from_paths<I, S>(store: SharedStore, paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for path in paths {
            let path = normalize_path(path.as_ref());
            if !store.contains(&path) {
                return Err(Error::InvalidSource(format!(
                    "{path} is not a dataset of {}",
                    store.name()
                )));
            }
            normalized.push(path);
        }
        Ok(Self::from_unsorted(store, normalized))
    }

    /// Empty selection on `store`.
    #[must_use]
    pub fn empty(store: SharedStore) -> Self {
        Self {
            store,
            paths: Vec::new(),
        }
    }

    fn from_unsorted(store: SharedStore, mut paths: Vec<String>) -> Self {
        paths.sort_unstable();
        paths.dedup();
        Self { store, paths }
    }

    fn with_paths(&self, paths: Vec<String>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            paths,
        }
    }

    /// Store of the selected datasets.
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Selected dataset paths in order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.paths
    }

    /// Number of selected datasets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns true if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterates over handles of the selected datasets.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = DatasetHandle> + '_ {
        self.paths
            .iter()
            .map(|p| DatasetHandle::new(Arc::clone(&self.store), p))
    }

    /// Dataset at `index`; negative values count from the end.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfRange`] if `index` is outside the selection.
    pub fn get(&self, index: isize) -> Result<DatasetHandle> {
        let position = self.position(index)?;
        Ok(DatasetHandle::new(
            Arc::clone(&self.store),
            &self.paths[position],
        ))
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn position(&self, index: isize) -> Result<usize> {
        let len = self.paths.len();
        let resolved = if index < 0 {
            index + len as isize
        } else {
            index
        };
        if resolved < 0 || resolved as usize >= len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        Ok(resolved as usize)
    }

    /// Keeps the datasets whose paths match `pattern`.
    ///
    /// # Errors
    /// Returns [`Error::PatternSyntax`] if the pattern is malformed.
    pub fn filter(&self, pattern: &str) -> Result<Self> {
        let patterns = PatternSet::parse(pattern)?;
        Ok(self.with_paths(
            self.paths
                .iter()
                .filter(|p| patterns.is_match(p))
                .cloned()
                .collect(),
        ))
    }

    /// Keeps the datasets for which `predicate` returns true.
    ///
    /// # Errors
    /// Propagates the first error returned by `predicate`.
    pub fn filter_with<F>(&self, mut predicate: F) -> Result<Self>
    where
        F: FnMut(&DatasetHandle) -> Result<bool>,
    {
        let mut kept = Vec::new();
        for handle in self.iter() {
            if predicate(&handle)? {
                kept.push(handle.path);
            }
        }
        Ok(self.with_paths(kept))
    }

    /// Selection over a Python-style slice of positions, re-sorted.
    ///
    /// # Errors
    /// Returns an error if the slice step is zero.
    pub fn slice(&self, spec: impl Into<SliceSpec>) -> Result<Self> {
        let positions = spec.into().indices(self.len())?;
        Ok(self.pick(&positions))
    }

    /// Selection of the positions where `mask` is true.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if the mask length differs from the selection.
    pub fn select_mask(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.len() {
            return Err(Error::LengthMismatch {
                what: "mask",
                expected: self.len(),
                actual: mask.len(),
            });
        }
        let positions: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        Ok(self.pick(&positions))
    }

    /// Selection of the given positions; duplicates collapse, result re-sorted.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfRange`] for a position outside the selection.
    pub fn select_positions(&self, positions: &[isize]) -> Result<Self> {
        let resolved = positions
            .iter()
            .map(|&index| self.position(index))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.pick(&resolved))
    }

    fn pick(&self, positions: &[usize]) -> Self {
        Self::from_unsorted(
            Arc::clone(&self.store),
            positions.iter().map(|&i| self.paths[i].clone()).collect(),
        )
    }

    fn check_same_store(&self, other: &Self) -> Result<()> {
        if same_store(&self.store, &other.store) {
            Ok(())
        } else {
            Err(Error::IncompatibleSelection)
        }
    }

    fn contains_path(&self, path: &str) -> bool {
        self.paths
            .binary_search_by(|p| p.as_str().cmp(path))
            .is_ok()
    }

    /// Sorted union of both selections.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleSelection`] for selections of different stores.
    pub fn union(&self, other: &Self) -> Result<Self> {
        self.check_same_store(other)?;
        let merged: BTreeSet<&String> = self.paths.iter().chain(other.paths.iter()).collect();
        Ok(self.with_paths(merged.into_iter().cloned().collect()))
    }

    /// Datasets of `self` that are not in `other`, in the order of `self`.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleSelection`] for selections of different stores.
    pub fn difference(&self, other: &Self) -> Result<Self> {
        self.check_same_store(other)?;
        Ok(self.with_paths(
            self.paths
                .iter()
                .filter(|p| !other.contains_path(p))
                .cloned()
                .collect(),
        ))
    }

    /// In-place [`Self::union`].
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleSelection`] for selections of different stores.
    pub fn union_with(&mut self, other: &Self) -> Result<()> {
        *self = self.union(other)?;
        Ok(())
    }

    /// In-place [`Self::difference`].
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleSelection`] for selections of different stores.
    pub fn subtract(&mut self, other: &Self) -> Result<()> {
        self.check_same_store(other)?;
        self.paths.retain(|p| !other.contains_path(p));
        Ok(())
    }

    /// Returns true if every dataset of `self` is in `other`.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleSelection`] for selections of different stores.
    pub fn is_subset(&self, other: &Self) -> Result<bool> {
        self.check_same_store(other)?;
        Ok(self.paths.iter().all(|p| other.contains_path(p)))
    }

    /// Returns true if every dataset of `other` is in `self`.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleSelection`] for selections of different stores.
    pub fn is_superset(&self, other: &Self) -> Result<bool> {
        other.is_subset(self)
    }

    /// Subset that is not equal.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleSelection`] for selections of different stores.
    pub fn is_strict_subset(&self, other: &Self) -> Result<bool> {
        Ok(self.len() < other.len() && self.is_subset(other)?)
    }

    /// Superset that is not equal.
    ///
    /// # Errors
    /// Returns [`Error::IncompatibleSelection`] for selections of different stores.
    pub fn is_strict_superset(&self, other: &Self) -> Result<bool> {
        other.is_strict_subset(self)
    }

    /// Returns true if `handle` refers to a selected dataset of the same store.
    #[must_use]
    pub fn contains(&self, handle: &DatasetHandle) -> bool {
        same_store(&self.store, handle.store()) && self.contains_path(handle.path())
    }

    /// Splits the selection by `keys`, one key per dataset.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if `keys` and the selection differ in length.
    pub fn group_by<K: PartialEq + Clone>(&self, keys: &[K]) -> Result<Vec<Self>> {
        Ok(self
            .group_by_keys(keys)?
            .into_iter()
            .map(|(_, group)| group)
            .collect())
    }

    /// Like [`Self::group_by`], pairing each group with its key.
    ///
    /// Groups follow the first appearance of each key.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if `keys` and the selection differ in length.
    pub fn group_by_keys<K: PartialEq + Clone>(&self, keys: &[K]) -> Result<Vec<(K, Self)>> {
        if keys.len() != self.len() {
            return Err(Error::LengthMismatch {
                what: "group keys",
                expected: self.len(),
                actual: keys.len(),
            });
        }
        let groups = KeyGroups::from_keys(keys);
        Ok(groups
            .iter()
            .map(|(key, positions)| {
                let paths = positions.iter().map(|&i| self.paths[i].clone()).collect();
                (key.clone(), self.with_paths(paths))
            })
            .collect())
    }

    /// Minimum of every dataset (after `slice`), one value per dataset.
    ///
    /// # Errors
    /// Returns an error if a read fails or a sliced dataset is empty.
    pub fn min(&self, slice: &ArraySlice) -> Result<Vec<f64>> {
        self.fold_each(slice, f64::INFINITY, f64::min)
    }

    /// Maximum of every dataset (after `slice`), one value per dataset.
    ///
    /// # Errors
    /// Returns an error if a read fails or a sliced dataset is empty.
    pub fn max(&self, slice: &ArraySlice) -> Result<Vec<f64>> {
        self.fold_each(slice, f64::NEG_INFINITY, f64::max)
    }

    fn fold_each(&self, slice: &ArraySlice, init: f64, op: fn(f64, f64) -> f64) -> Result<Vec<f64>> {
        self.paths
            .par_iter()
            .map(|path| {
                let data = self.store.read_array(path, slice)?;
                if data.is_empty() {
                    return Err(Error::InvalidConfig(format!(
                        "slice of {path} selects no values"
                    )));
                }
                Ok(data.iter().copied().fold(init, op))
            })
            .collect()
    }

    /// Elementwise sum of all datasets (after `slice`), in selection order.
    ///
    /// # Errors
    /// Returns [`Error::EmptySelection`] for an empty selection and
    /// [`Error::ShapeMismatch`] if the sliced shapes differ.
    pub fn sum(&self, slice: &ArraySlice) -> Result<ArrayD<f64>> {
        let mut paths = self.paths.iter();
        let first = paths.next().ok_or(Error::EmptySelection)?;
        let mut total = self.store.read_array(first, slice)?;
        for path in paths {
            let data = self.store.read_array(path, slice)?;
            if data.shape() != total.shape() {
                return Err(Error::shape_mismatch(total.shape(), data.shape()));
            }
            total += &data;
        }
        Ok(total)
    }
}

impl PartialEq for DatasetSelection {
    fn eq(&self, other: &Self) -> bool {
        same_store(&self.store, &other.store) && self.paths == other.paths
    }
}

/// Orders selections of the same store by set containment.
impl PartialOrd for DatasetSelection {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let sub = self.is_subset(other).ok()?;
        let sup = other.is_subset(self).ok()?;
        match (sub, sup) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl fmt::Debug for DatasetSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetSelection")
            .field("store", &self.store.name())
            .field("paths", &self.paths)
            .finish()
    }
}

impl fmt::Display for DatasetSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for path in &self.paths {
            writeln!(f, "{path}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use ndarray::{arr1, arr2};

    fn store() -> SharedStore {
        let mut store = MemoryStore::new("test");
        for tag in [3, 1, 2, 10] {
            let value = f64::from(tag);
            store.insert(
                &format!("/run_7/detector_2d_1/tag_{tag}/detector_data"),
                arr2(&[[value, 0.0], [1.0, -value]]),
            );
        }
        store.insert("/run_7/event_info/delay", arr1(&[0.1, 0.2, 0.1, 0.2]));
        store.into_shared()
    }

    fn frames(store: &SharedStore) -> DatasetSelection {
        DatasetSelection::from_store(Arc::clone(store), "detector_data$", None).unwrap()
    }

    #[test]
    fn test_from_store_sorted_and_filtered() {
        let s = store();
        let sel = frames(&s);
        assert_eq!(sel.len(), 4);
        let mut sorted = sel.names().to_vec();
        sorted.sort();
        assert_eq!(sel.names(), sorted.as_slice());
        assert_eq!(
            sel.names()[0],
            "/run_7/detector_2d_1/tag_1/detector_data"
        );
        let all = DatasetSelection::from_store(Arc::clone(&s), "", None).unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_subtree() {
        let s = store();
        let sel = DatasetSelection::from_store(s, "", Some("/run_7/event_info")).unwrap();
        assert_eq!(sel.names(), &["/run_7/event_info/delay"]);
    }

    #[test]
    fn test_get_and_negative_index() {
        let sel = frames(&store());
        assert_eq!(sel.get(0).unwrap().path(), sel.names()[0]);
        assert_eq!(sel.get(-1).unwrap().path(), sel.names()[3]);
        assert!(matches!(sel.get(4), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(sel.get(-5), Err(Error::IndexOutOfRange { .. })));
        let handle = sel.get(0).unwrap();
        assert_eq!(handle.name(), "detector_data");
        assert_eq!(handle.parent(), "/run_7/detector_2d_1/tag_1");
    }

    #[test]
    fn test_filter_pattern_and_predicate() {
        let sel = frames(&store());
        let early = sel.filter("tag_<1-2>/").unwrap();
        assert_eq!(early.len(), 2);
        let positive = sel
            .filter_with(|ds| Ok(ds.read()?.iter().next().copied().unwrap_or(0.0) > 2.5))
            .unwrap();
        assert_eq!(positive.len(), 2);
        assert!(positive.is_subset(&sel).unwrap());
    }

    #[test]
    fn test_slices_resort() {
        let sel = frames(&store());
        let rev = sel.slice(SliceSpec::full().with_step(-1)).unwrap();
        assert_eq!(rev, sel);
        let head = sel.slice(..2).unwrap();
        assert_eq!(head.names(), &sel.names()[..2]);
        let picked = sel.select_positions(&[3, 0, 3]).unwrap();
        assert_eq!(picked.names(), &[sel.names()[0].clone(), sel.names()[3].clone()]);
        let first = sel.slice(SliceSpec::full().with_step(isize::MAX)).unwrap();
        assert_eq!(first.names(), &sel.names()[..1]);
        let last = sel.slice(SliceSpec::full().with_step(isize::MIN)).unwrap();
        assert_eq!(last.names(), &sel.names()[3..]);
        let masked = sel.select_mask(&[false, true, true, false]).unwrap();
        assert_eq!(masked.len(), 2);
        assert!(matches!(
            sel.select_mask(&[true]),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_set_operations() {
        let sel = frames(&store());
        let a = sel.slice(..3).unwrap();
        let b = sel.slice(1..).unwrap();
        assert_eq!(a.union(&b).unwrap(), sel);
        let diff = sel.difference(&b).unwrap();
        assert_eq!(diff.names(), &sel.names()[..1]);
        assert!(a.is_strict_subset(&sel).unwrap());
        assert!(sel.is_strict_superset(&a).unwrap());
        assert!(sel.is_subset(&sel).unwrap());
        assert!(!sel.is_strict_subset(&sel).unwrap());
        assert_eq!(a.partial_cmp(&sel), Some(Ordering::Less));
        assert_eq!(a.partial_cmp(&b), None);

        let mut c = a.clone();
        c.subtract(&b).unwrap();
        assert_eq!(c, diff);
        c.union_with(&b).unwrap();
        assert_eq!(c, sel);
    }

    #[test]
    fn test_incompatible_stores() {
        let a = frames(&store());
        let b = frames(&store());
        assert!(matches!(a.union(&b), Err(Error::IncompatibleSelection)));
        assert!(matches!(a.difference(&b), Err(Error::IncompatibleSelection)));
        assert!(matches!(a.is_subset(&b), Err(Error::IncompatibleSelection)));
        assert_ne!(a, b);
        assert_eq!(a.partial_cmp(&b), None);
        assert!(!a.contains(&b.get(0).unwrap()));
        assert!(a.contains(&a.get(0).unwrap()));
    }

    #[test]
    fn test_copy_is_independent() {
        let sel = frames(&store());
        let mut copy = sel.clone();
        assert_eq!(copy, sel);
        assert!(same_store(copy.store(), sel.store()));
        copy.subtract(&sel.slice(..1).unwrap()).unwrap();
        assert_eq!(copy.len(), 3);
        assert_eq!(sel.len(), 4);
    }

    #[test]
    fn test_group_by() {
        let sel = frames(&store());
        let groups = sel.group_by_keys(&["a", "b", "a", "b"]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "a");
        assert_eq!(
            groups[0].1.names(),
            &[sel.names()[0].clone(), sel.names()[2].clone()]
        );
        let total: usize = groups.iter().map(|(_, g)| g.len()).sum();
        assert_eq!(total, sel.len());
        assert!(matches!(
            sel.group_by(&[1, 2]),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_reductions() {
        let sel = frames(&store());
        // lexicographic order: tag_1, tag_10, tag_2, tag_3
        assert_eq!(sel.min(&ArraySlice::full()).unwrap(), vec![-1.0, -10.0, -2.0, -3.0]);
        assert_eq!(sel.max(&ArraySlice::full()).unwrap(), vec![1.0, 10.0, 2.0, 3.0]);
        let first_row = ArraySlice::new(vec![SliceSpec::from(..1)]);
        assert_eq!(sel.max(&first_row).unwrap(), vec![1.0, 10.0, 2.0, 3.0]);
        let sum = sel.sum(&ArraySlice::full()).unwrap();
        assert_eq!(sum, arr2(&[[16.0, 0.0], [4.0, -16.0]]).into_dyn());
    }

    #[test]
    fn test_sum_errors() {
        let s = store();
        let all = DatasetSelection::from_store(Arc::clone(&s), "run_7", None).unwrap();
        assert!(matches!(
            all.sum(&ArraySlice::full()),
            Err(Error::ShapeMismatch { .. })
        ));
        let none = DatasetSelection::empty(s);
        assert!(matches!(
            none.sum(&ArraySlice::full()),
            Err(Error::EmptySelection)
        ));
    }

    #[test]
    fn test_from_paths() {
        let s = store();
        let sel = DatasetSelection::from_paths(
            Arc::clone(&s),
            ["run_7/event_info/delay", "/run_7/event_info/delay"],
        )
        .unwrap();
        assert_eq!(sel.len(), 1);
        assert!(matches!(
            DatasetSelection::from_paths(s, ["/nope"]),
            Err(Error::InvalidSource(_))
        ));
    }
}
