//! Hierarchical dataset store abstraction.
//!
//! A store is a tree of groups whose leaves are n-dimensional numeric
//! datasets addressed by absolute `/`-separated paths. Selections and frame
//! pipelines only read from stores; nothing in this workspace mutates one.

use crate::slicing::ArraySlice;
use crate::{Error, Result};
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Shared handle to a store.
pub type SharedStore = Arc<dyn DatasetStore>;

/// Access mode for opening a store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only access.
    #[default]
    Read,
    /// Read-write access to an existing store.
    ReadWrite,
}

/// Read interface over a hierarchical keyed dataset store.
pub trait DatasetStore: Send + Sync {
    /// Lists all leaf dataset paths, normalized with a leading `/`.
    ///
    /// With `subtree` set, only datasets below that group are listed.
    fn list_dataset_paths(&self, subtree: Option<&str>) -> Result<Vec<String>>;

    /// Reads a dataset, or a sub-array of it, as `f64` values.
    fn read_array(&self, path: &str, slice: &ArraySlice) -> Result<ArrayD<f64>>;

    /// Reads a single value; for array nodes this is the first element.
    fn read_scalar(&self, path: &str) -> Result<f64>;

    /// Shape of a dataset.
    fn shape(&self, path: &str) -> Result<Vec<usize>>;

    /// Returns true if a dataset exists at `path`.
    fn contains(&self, path: &str) -> bool;

    /// Run number declared by the store for paths outside any `run_<N>` group.
    fn default_run(&self) -> Option<u64> {
        None
    }

    /// Human-readable store name, used in messages.
    fn name(&self) -> String {
        String::from("<store>")
    }
}

/// Opens stores by file path.
pub trait StoreOpener {
    /// Opens the store at `path`.
    fn open(&self, path: &Path, mode: OpenMode) -> Result<SharedStore>;
}

/// Normalizes a dataset or group path to start with a single `/`
/// and carry no empty segments.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Returns true if both handles point at the same store object.
#[must_use]
pub fn same_store(a: &SharedStore, b: &SharedStore) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// In-memory store, mainly for tests and synthetic data.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    name: String,
    datasets: BTreeMap<String, ArrayD<f64>>,
    default_run: Option<u64>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds or replaces a dataset.
    pub fn insert<D: ndarray::Dimension>(
        &mut self,
        path: &str,
        data: ndarray::Array<f64, D>,
    ) -> &mut Self {
        self.datasets.insert(normalize_path(path), data.into_dyn());
        self
    }

    /// Adds a zero-dimensional dataset holding `value`.
    pub fn insert_scalar(&mut self, path: &str, value: f64) -> &mut Self {
        self.insert(path, ndarray::arr0(value))
    }

    /// Sets the run number used for paths outside any `run_<N>` group.
    #[must_use]
    pub fn with_default_run(mut self, run: u64) -> Self {
        self.default_run = Some(run);
        self
    }

    /// Wraps the store into a shared handle.
    #[must_use]
    pub fn into_shared(self) -> SharedStore {
        Arc::new(self)
    }

    fn dataset(&self, path: &str) -> Result<&ArrayD<f64>> {
        let path = normalize_path(path);
        self.datasets
            .get(&path)
            .ok_or(Error::DatasetNotFound(path))
    }
}

impl DatasetStore for MemoryStore {
    fn list_dataset_paths(&self, subtree: Option<&str>) -> Result<Vec<String>> {
        let prefix = match subtree.map(normalize_path) {
            Some(root) if root != "/" => {
                if self.datasets.contains_key(&root) {
                    return Err(Error::InvalidSource(format!("{root} is a dataset, not a group")));
                }
                format!("{root}/")
            }
            _ => String::from("/"),
        };
        let paths: Vec<String> = self
            .datasets
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .cloned()
            .collect();
        if paths.is_empty() && prefix != "/" {
            return Err(Error::InvalidSource(format!("no group at {prefix}")));
        }
        Ok(paths)
    }

    fn read_array(&self, path: &str, slice: &ArraySlice) -> Result<ArrayD<f64>> {
        let data = self.dataset(path)?;
        Ok(slice.apply(data.view())?.to_owned())
    }

    fn read_scalar(&self, path: &str) -> Result<f64> {
        let normalized = normalize_path(path);
        self.dataset(path)?
            .iter()
            .next()
            .copied()
            .ok_or_else(|| Error::Store(format!("dataset {normalized} is empty")))
    }

    fn shape(&self, path: &str) -> Result<Vec<usize>> {
        Ok(self.dataset(path)?.shape().to_vec())
    }

    fn contains(&self, path: &str) -> bool {
        self.datasets.contains_key(&normalize_path(path))
    }

    fn default_run(&self) -> Option<u64> {
        self.default_run
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}
