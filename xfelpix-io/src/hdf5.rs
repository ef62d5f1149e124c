//! HDF5 store backend and reduction output.
//!
//! SACLA files keep one group per run, `/run_<N>`, with detector frames at
//! `/run_<N>/detector_2d_<k>/tag_<T>/detector_data`. Run numbers of a file
//! are listed in `/file_info/run_number_list`.
#![allow(clippy::cast_sign_loss)]

use crate::{Error, Result};
use hdf5::types::VarLenUnicode;
use hdf5::{Dataset, File, Group};
use log::debug;
use ndarray::{s, ArrayD, ArrayView1, IxDyn};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use xfelpix_core::store::normalize_path;
use xfelpix_core::{ArraySlice, DatasetStore, OpenMode, SharedStore, StoreOpener};

type CoreResult<T> = xfelpix_core::Result<T>;

const RUN_LIST_PATH: &str = "/file_info/run_number_list";
const FORMAT_VERSION: &str = "0.1";

/// Opens an HDF5 file as a shared store.
///
/// # Errors
/// Returns an error if the file cannot be opened.
pub fn open_store<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<SharedStore> {
    Ok(Arc::new(Hdf5Store::open(path, mode)?))
}

/// [`StoreOpener`] for HDF5 files.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hdf5Opener;

impl StoreOpener for Hdf5Opener {
    fn open(&self, path: &Path, mode: OpenMode) -> CoreResult<SharedStore> {
        Ok(open_store(path, mode)?)
    }
}

/// Read access to the datasets of one HDF5 file.
pub struct Hdf5Store {
    file: File,
    path: PathBuf,
    default_run: Option<u64>,
}

impl Hdf5Store {
    /// Opens `path` read-only or read-write.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = match mode {
            OpenMode::Read => File::open(&path)?,
            OpenMode::ReadWrite => File::open_rw(&path)?,
        };
        let default_run = detect_default_run(&file)?;
        debug!("opened {} (default run {default_run:?})", path.display());
        Ok(Self {
            file,
            path,
            default_run,
        })
    }

    /// File path of the store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dataset(&self, path: &str) -> CoreResult<Dataset> {
        let path = normalize_path(path);
        if !self.contains(&path) {
            return Err(xfelpix_core::Error::DatasetNotFound(path));
        }
        self.file.dataset(&path).map_err(store_error)
    }
}

impl std::fmt::Debug for Hdf5Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hdf5Store")
            .field("path", &self.path)
            .field("default_run", &self.default_run)
            .finish_non_exhaustive()
    }
}

impl DatasetStore for Hdf5Store {
    fn list_dataset_paths(&self, subtree: Option<&str>) -> CoreResult<Vec<String>> {
        let root = normalize_path(subtree.unwrap_or("/"));
        let group = self.file.group(&root).map_err(|_| {
            xfelpix_core::Error::InvalidSource(format!(
                "{root} is not a group of {}",
                self.path.display()
            ))
        })?;
        let mut paths = Vec::new();
        collect_datasets(&group, &mut paths).map_err(store_error)?;
        Ok(paths)
    }

    fn read_array(&self, path: &str, slice: &ArraySlice) -> CoreResult<ArrayD<f64>> {
        let dataset = self.dataset(path)?;
        let shape = dataset.shape();
        let sliced = slice.sliced_shape(&shape)?;
        if sliced.contains(&0) {
            return Ok(ArrayD::zeros(IxDyn(&sliced)));
        }
        if shape.len() == 2 && !slice.is_full() && slice.axes().iter().all(|a| a.step > 0) {
            let (r0, r1, rs) = axis_bounds(slice, 0, shape[0])?;
            let (c0, c1, cs) = axis_bounds(slice, 1, shape[1])?;
            let data = dataset
                .read_slice_2d::<f64, _>(s![r0..r1;rs, c0..c1;cs])
                .map_err(store_error)?;
            return Ok(data.into_dyn());
        }
        let data = dataset.read_dyn::<f64>().map_err(store_error)?;
        Ok(slice.apply(data.view())?.to_owned())
    }

    fn read_scalar(&self, path: &str) -> CoreResult<f64> {
        let values = self
            .dataset(path)?
            .read_raw::<f64>()
            .map_err(store_error)?;
        values.first().copied().ok_or_else(|| {
            xfelpix_core::Error::Store(format!("dataset {} is empty", normalize_path(path)))
        })
    }

    fn shape(&self, path: &str) -> CoreResult<Vec<usize>> {
        Ok(self.dataset(path)?.shape())
    }

    fn contains(&self, path: &str) -> bool {
        let path = normalize_path(path);
        path != "/" && link_exists(&self.file, &path) && self.file.dataset(&path).is_ok()
    }

    fn default_run(&self) -> Option<u64> {
        self.default_run
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

fn store_error(error: hdf5::Error) -> xfelpix_core::Error {
    xfelpix_core::Error::Store(error.to_string())
}

/// Resolved `(start, stop, step)` of a positive-step axis slice.
fn axis_bounds(slice: &ArraySlice, axis: usize, len: usize) -> CoreResult<(usize, usize, isize)> {
    let spec = slice.axes().get(axis).copied().unwrap_or_default();
    let (start, stop, step) = spec.resolve(len)?;
    Ok((start as usize, stop as usize, step))
}

/// Checks every link along `path`, since HDF5 fails on missing intermediates.
fn link_exists(group: &Group, path: &str) -> bool {
    let mut prefix = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        prefix.push('/');
        prefix.push_str(segment);
        if !group.link_exists(&prefix) {
            return false;
        }
    }
    true
}

fn collect_datasets(group: &Group, paths: &mut Vec<String>) -> hdf5::Result<()> {
    for dataset in group.datasets()? {
        paths.push(normalize_path(&dataset.name()));
    }
    for child in group.groups()? {
        collect_datasets(&child, paths)?;
    }
    Ok(())
}

/// First entry of the file's run list, else the only `run_<N>` root group.
fn detect_default_run(file: &File) -> Result<Option<u64>> {
    if link_exists(file, RUN_LIST_PATH) {
        if let Ok(list) = file.dataset(RUN_LIST_PATH) {
            let runs = list.read_raw::<i64>()?;
            if let Some(&run) = runs.first() {
                let run = u64::try_from(run).map_err(|_| {
                    Error::InvalidFormat(format!("negative run number {run} in {RUN_LIST_PATH}"))
                })?;
                return Ok(Some(run));
            }
        }
    }
    let runs: Vec<u64> = file
        .member_names()?
        .iter()
        .filter_map(|name| name.strip_prefix("run_"))
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|digits| digits.parse().ok())
        .collect();
    Ok(match runs.as_slice() {
        [run] => Some(*run),
        _ => None,
    })
}

/// Compressed reduction result: one row of `data` per group key.
#[derive(Clone, Debug, PartialEq)]
pub struct ReductionData {
    /// Group keys, one per row of `data`.
    pub keys: Option<Vec<f64>>,
    /// Per-group results stacked along axis 0.
    pub data: ArrayD<f64>,
    /// Extra one-dimensional arrays stored next to the result.
    pub extras: Vec<(String, Vec<f64>)>,
}

impl ReductionData {
    /// Result without keys or extras.
    #[must_use]
    pub fn new(data: ArrayD<f64>) -> Self {
        Self {
            keys: None,
            data,
            extras: Vec::new(),
        }
    }

    /// Attaches group keys.
    #[must_use]
    pub fn with_keys(mut self, keys: Vec<f64>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Attaches an extra array.
    #[must_use]
    pub fn with_extra(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.extras.push((name.into(), values));
        self
    }
}

/// Output options for [`write_reduction_hdf5`].
#[derive(Clone, Debug)]
pub struct ReductionWriteOptions {
    /// Deflate level, `None` to store uncompressed.
    pub compression: Option<u8>,
    /// Enable the shuffle filter.
    pub shuffle: bool,
    /// Source file recorded as an attribute.
    pub source: Option<String>,
}

impl Default for ReductionWriteOptions {
    fn default() -> Self {
        Self {
            compression: Some(4),
            shuffle: true,
            source: None,
        }
    }
}

/// Writes a reduction result to a new HDF5 file.
///
/// The file holds `/data`, optionally `/keys`, and one dataset per extra.
///
/// # Errors
/// Returns an error if HDF5 I/O fails, the key count differs from the
/// number of rows, or an extra uses a reserved or empty name.
pub fn write_reduction_hdf5<P: AsRef<Path>>(
    path: P,
    data: &ReductionData,
    options: &ReductionWriteOptions,
) -> Result<()> {
    validate_reduction(data)?;

    let file = File::create(path.as_ref())?;
    set_attr_str(&file, "xfelpix_format_version", FORMAT_VERSION)?;
    if let Some(source) = &options.source {
        set_attr_str(&file, "source", source)?;
    }

    let compression = options.compression.filter(|_| !data.data.is_empty());
    let dataset = file
        .new_dataset::<f64>()
        .shape(data.data.shape().to_vec());
    let dataset = match compression {
        Some(level) if options.shuffle => dataset.shuffle().deflate(level),
        Some(level) => dataset.deflate(level),
        None => dataset,
    };
    dataset.create("data")?.write(data.data.view())?;

    if let Some(keys) = &data.keys {
        write_vec(&file, "keys", keys)?;
    }
    for (name, values) in &data.extras {
        write_vec(&file, name, values)?;
    }
    debug!(
        "wrote reduction {:?} to {}",
        data.data.shape(),
        path.as_ref().display()
    );
    Ok(())
}

/// Reads a file written by [`write_reduction_hdf5`].
///
/// # Errors
/// Returns an error if HDF5 I/O fails or `/data` is missing.
pub fn read_reduction_hdf5<P: AsRef<Path>>(path: P) -> Result<ReductionData> {
    let file = File::open(path)?;
    let data = file.dataset("data")?.read_dyn::<f64>()?;
    let mut result = ReductionData::new(data);
    for dataset in file.datasets()? {
        let name = dataset.name().trim_start_matches('/').to_string();
        match name.as_str() {
            "data" => {}
            "keys" => result.keys = Some(dataset.read_raw::<f64>()?),
            _ => result.extras.push((name, dataset.read_raw::<f64>()?)),
        }
    }
    result.extras.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(result)
}

fn validate_reduction(data: &ReductionData) -> Result<()> {
    if let Some(keys) = &data.keys {
        let rows = data.data.shape().first().copied().unwrap_or(0);
        if keys.len() != rows {
            return Err(Error::InvalidFormat(format!(
                "{} keys for {rows} result rows",
                keys.len()
            )));
        }
    }
    for (name, _) in &data.extras {
        if name.is_empty() || name.contains('/') || name == "data" || name == "keys" {
            return Err(Error::InvalidFormat(format!(
                "invalid extra dataset name {name:?}"
            )));
        }
    }
    Ok(())
}

fn write_vec(group: &Group, name: &str, values: &[f64]) -> Result<()> {
    group
        .new_dataset::<f64>()
        .shape((values.len(),))
        .create(name)?
        .write(ArrayView1::from(values))?;
    Ok(())
}

fn set_attr_str(group: &Group, name: &str, value: &str) -> Result<()> {
    let value = VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array2, Array3};
    use tempfile::NamedTempFile;

    fn write_frames(file: &File, run: u64, tags: &[u64]) {
        let detector = file
            .create_group(&format!("run_{run}"))
            .unwrap()
            .create_group("detector_2d_1")
            .unwrap();
        detector
            .create_group("detector_info")
            .unwrap()
            .new_dataset::<f64>()
            .shape((1,))
            .create("absolute_gain")
            .unwrap()
            .write(&arr1(&[2.0]))
            .unwrap();
        for &tag in tags {
            let frame = Array2::from_shape_fn((4, 5), |(r, c)| (tag * 100 + r as u64 * 5 + c as u64) as f64);
            detector
                .create_group(&format!("tag_{tag}"))
                .unwrap()
                .new_dataset::<f32>()
                .shape((4, 5))
                .create("detector_data")
                .unwrap()
                .write(&frame.mapv(|v| v as f32))
                .unwrap();
        }
    }

    #[test]
    fn test_store_lists_and_reads() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let file = File::create(tmp.path()).unwrap();
            write_frames(&file, 42, &[1, 2]);
        }
        let store = Hdf5Store::open(tmp.path(), OpenMode::Read).unwrap();
        assert_eq!(store.default_run(), Some(42));

        let paths = store.list_dataset_paths(None).unwrap();
        assert!(paths.contains(&"/run_42/detector_2d_1/tag_1/detector_data".to_string()));
        assert!(paths.contains(&"/run_42/detector_2d_1/detector_info/absolute_gain".to_string()));
        assert_eq!(paths.len(), 3);

        let frame_path = "/run_42/detector_2d_1/tag_2/detector_data";
        assert!(store.contains(frame_path));
        assert!(!store.contains("/run_42/detector_2d_1/tag_9/detector_data"));
        assert!(!store.contains("/run_42/detector_2d_1"));
        assert_eq!(store.shape(frame_path).unwrap(), vec![4, 5]);

        let full = store.read_array(frame_path, &ArraySlice::full()).unwrap();
        assert_eq!(full[[3, 4]], 219.0);
        let roi = ArraySlice::new(vec![(1..3).into(), (2..5).into()]);
        let cropped = store.read_array(frame_path, &roi).unwrap();
        assert_eq!(cropped.shape(), &[2, 3]);
        assert_eq!(cropped[[0, 0]], 207.0);

        let gain = store
            .read_scalar("/run_42/detector_2d_1/detector_info/absolute_gain")
            .unwrap();
        assert_eq!(gain, 2.0);
        assert!(matches!(
            store.read_scalar("/missing"),
            Err(xfelpix_core::Error::DatasetNotFound(_))
        ));
    }

    #[test]
    fn test_default_run_from_run_list() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let file = File::create(tmp.path()).unwrap();
            write_frames(&file, 7, &[1]);
            write_frames(&file, 8, &[1]);
            file.create_group("file_info")
                .unwrap()
                .new_dataset::<i64>()
                .shape((2,))
                .create("run_number_list")
                .unwrap()
                .write(&arr1(&[8_i64, 7]))
                .unwrap();
        }
        let store = Hdf5Store::open(tmp.path(), OpenMode::Read).unwrap();
        assert_eq!(store.default_run(), Some(8));
        let run_7 = store.list_dataset_paths(Some("/run_7")).unwrap();
        assert_eq!(run_7.len(), 2);
        assert!(store.list_dataset_paths(Some("/run_9")).is_err());
    }

    #[test]
    fn test_no_default_run_with_two_runs() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let file = File::create(tmp.path()).unwrap();
            write_frames(&file, 1, &[1]);
            write_frames(&file, 2, &[1]);
        }
        let store = open_store(tmp.path(), OpenMode::Read).unwrap();
        assert_eq!(store.default_run(), None);
    }

    #[test]
    fn test_reduction_roundtrip() {
        let tmp = NamedTempFile::new().unwrap();
        let data = Array3::from_shape_fn((2, 3, 4), |(g, r, c)| (g * 12 + r * 4 + c) as f64);
        let reduction = ReductionData::new(data.into_dyn())
            .with_keys(vec![0.5, 1.5])
            .with_extra("frames_per_key", vec![3.0, 5.0]);
        let options = ReductionWriteOptions {
            source: Some("run_42.h5".to_string()),
            ..ReductionWriteOptions::default()
        };
        write_reduction_hdf5(tmp.path(), &reduction, &options).unwrap();
        let loaded = read_reduction_hdf5(tmp.path()).unwrap();
        assert_eq!(loaded, reduction);
    }

    #[test]
    fn test_reduction_validation() {
        let tmp = NamedTempFile::new().unwrap();
        let data = ArrayD::zeros(IxDyn(&[2, 2]));
        let bad_keys = ReductionData::new(data.clone()).with_keys(vec![1.0]);
        assert!(matches!(
            write_reduction_hdf5(tmp.path(), &bad_keys, &ReductionWriteOptions::default()),
            Err(Error::InvalidFormat(_))
        ));
        let bad_extra = ReductionData::new(data).with_extra("keys", vec![]);
        assert!(matches!(
            write_reduction_hdf5(tmp.path(), &bad_extra, &ReductionWriteOptions::default()),
            Err(Error::InvalidFormat(_))
        ));
    }
}
