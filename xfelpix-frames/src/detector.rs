//! Per-run detector configuration.
//!
//! Converting raw detector values to photon counts needs the absolute gain
//! of the detector and the photon energy of the run:
//!
//! ```text
//! e_per_ph  = photon_energy_in_eV / (SILICON_GAP_EV * absolute_gain)
//! tophotons = 1 / e_per_ph
//! ```
//!
//! Both values live in the store next to the frames. The gain is found
//! relative to the detector group a fixed number of levels above the frame
//! dataset, the photon energy relative to the run group.

use log::debug;
use std::collections::HashMap;
use std::fmt;
use xfelpix_core::store::{normalize_path, SharedStore};
use xfelpix_core::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Energy in eV needed to create one electron-hole pair in silicon.
pub const SILICON_GAP_EV: f64 = 3.65;

/// Derived detector configuration of one run.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorConfig {
    /// Run the configuration was read from.
    pub run_number: u64,
    /// Absolute detector gain.
    pub absolute_gain: f64,
    /// Photon energy in eV.
    pub photon_energy_ev: f64,
    /// Detector units per photon.
    pub e_per_ph: f64,
    /// Factor converting detector units to photon counts.
    pub tophotons: f64,
}

impl DetectorConfig {
    /// Derives the conversion factors from gain and photon energy.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] unless both inputs are finite and positive.
    pub fn new(run_number: u64, absolute_gain: f64, photon_energy_ev: f64) -> Result<Self> {
        for (name, value) in [
            ("absolute gain", absolute_gain),
            ("photon energy", photon_energy_ev),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "run {run_number}: {name} must be positive, got {value}"
                )));
            }
        }
        let e_per_ph = photon_energy_ev / (SILICON_GAP_EV * absolute_gain);
        Ok(Self {
            run_number,
            absolute_gain,
            photon_energy_ev,
            e_per_ph,
            tophotons: 1.0 / e_per_ph,
        })
    }
}

/// Where the configuration nodes are found relative to a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorLayout {
    /// Gain node, relative to the detector group.
    pub gain_path: String,
    /// Photon energy node, relative to the run group.
    pub energy_path: String,
    /// How many levels the detector group sits above a frame dataset.
    pub detector_levels_up: usize,
}

impl Default for DetectorLayout {
    fn default() -> Self {
        Self::sacla()
    }
}

impl DetectorLayout {
    /// Layout of SACLA files: `/run_<N>/detector_2d_<k>/tag_<T>/detector_data`.
    #[must_use]
    pub fn sacla() -> Self {
        Self {
            gain_path: "detector_info/absolute_gain".to_string(),
            energy_path: "run_info/sacla_config/photon_energy_in_eV".to_string(),
            detector_levels_up: 2,
        }
    }

    /// Sets the gain node path.
    #[must_use]
    pub fn with_gain_path(mut self, path: impl Into<String>) -> Self {
        self.gain_path = path.into();
        self
    }

    /// Sets the photon energy node path.
    #[must_use]
    pub fn with_energy_path(mut self, path: impl Into<String>) -> Self {
        self.energy_path = path.into();
        self
    }

    /// Sets the distance from a frame to its detector group.
    #[must_use]
    pub fn with_detector_levels_up(mut self, levels: usize) -> Self {
        self.detector_levels_up = levels;
        self
    }
}

/// Run number of a path whose first segment is `run_<N>`.
#[must_use]
pub fn run_number_of(path: &str) -> Option<u64> {
    let first = path.trim_start_matches('/').split('/').next()?;
    let digits = first.strip_prefix("run_")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn join(group: &str, relative: &str) -> String {
    normalize_path(&format!("{group}/{relative}"))
}

/// Resolves [`DetectorConfig`] for frame datasets of one store.
#[derive(Clone)]
pub struct DetectorConfigLookup {
    store: SharedStore,
    layout: DetectorLayout,
}

impl DetectorConfigLookup {
    /// Creates a lookup with the SACLA layout.
    #[must_use]
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            layout: DetectorLayout::default(),
        }
    }

    /// Replaces the layout.
    #[must_use]
    pub fn with_layout(mut self, layout: DetectorLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Layout in use.
    #[must_use]
    pub fn layout(&self) -> &DetectorLayout {
        &self.layout
    }

    /// Detector group of a frame dataset.
    ///
    /// # Errors
    /// Returns [`Error::ConfigNotFound`] if the path is too shallow.
    pub fn detector_group(&self, dataset_path: &str) -> Result<String> {
        let path = normalize_path(dataset_path);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let levels = self.layout.detector_levels_up;
        if segments.len() <= levels {
            return Err(Error::ConfigNotFound {
                run: run_number_of(&path),
                path: format!("{path} has no group {levels} levels up"),
            });
        }
        Ok(normalize_path(&segments[..segments.len() - levels].join("/")))
    }

    /// Resolves the configuration of the run a frame dataset belongs to.
    ///
    /// A leading `run_<N>` segment names the run; other paths fall back to
    /// the store's default run.
    ///
    /// # Errors
    /// Returns [`Error::ConfigNotFound`] if the run or its gain or energy
    /// nodes cannot be located.
    pub fn resolve(&self, dataset_path: &str) -> Result<DetectorConfig> {
        let path = normalize_path(dataset_path);
        let detector_group = self.detector_group(&path)?;
        let (run, run_root) = self.run_root(&path)?;

        let gain_path = join(&detector_group, &self.layout.gain_path);
        let energy_path = join(&run_root, &self.layout.energy_path);
        for node in [&gain_path, &energy_path] {
            if !self.store.contains(node) {
                return Err(Error::ConfigNotFound {
                    run: Some(run),
                    path: node.clone(),
                });
            }
        }
        let absolute_gain = self.store.read_scalar(&gain_path)?;
        let photon_energy_ev = self.store.read_scalar(&energy_path)?;
        let config = DetectorConfig::new(run, absolute_gain, photon_energy_ev)?;
        debug!(
            "run {run}: gain {absolute_gain}, photon energy {photon_energy_ev} eV, tophotons {}",
            config.tophotons
        );
        Ok(config)
    }

    fn run_root(&self, path: &str) -> Result<(u64, String)> {
        if let Some(run) = run_number_of(path) {
            let segment = path.trim_start_matches('/').split('/').next().unwrap_or_default();
            return Ok((run, format!("/{segment}")));
        }
        let run = self.store.default_run().ok_or_else(|| Error::ConfigNotFound {
            run: None,
            path: format!("{path} is outside any run group and the store has no default run"),
        })?;
        let candidate = format!("/run_{run}");
        if self.store.contains(&join(&candidate, &self.layout.energy_path)) {
            Ok((run, candidate))
        } else {
            Ok((run, String::from("/")))
        }
    }
}

impl fmt::Debug for DetectorConfigLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorConfigLookup")
            .field("store", &self.store.name())
            .field("layout", &self.layout)
            .finish()
    }
}

/// Memoizes [`DetectorConfigLookup::resolve`] per detector group.
pub(crate) struct ConfigCache<'a> {
    lookup: &'a DetectorConfigLookup,
    entries: HashMap<String, DetectorConfig>,
}

impl<'a> ConfigCache<'a> {
    pub(crate) fn new(lookup: &'a DetectorConfigLookup) -> Self {
        Self {
            lookup,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn get(&mut self, dataset_path: &str) -> Result<DetectorConfig> {
        let group = self.lookup.detector_group(dataset_path)?;
        if let Some(config) = self.entries.get(&group) {
            return Ok(*config);
        }
        let config = self.lookup.resolve(dataset_path)?;
        self.entries.insert(group, config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, Array2};
    use xfelpix_core::MemoryStore;

    fn sacla_store() -> MemoryStore {
        let mut store = MemoryStore::new("sacla");
        store
            .insert("/run_42/detector_2d_1/tag_1/detector_data", Array2::<f64>::zeros((2, 2)))
            .insert("/run_42/detector_2d_1/detector_info/absolute_gain", arr1(&[2.0]))
            .insert_scalar("/run_42/run_info/sacla_config/photon_energy_in_eV", 7300.0);
        store
    }

    #[test]
    fn test_derived_fields() {
        let config = DetectorConfig::new(1, 2.0, 7300.0).unwrap();
        assert_relative_eq!(config.e_per_ph, 7300.0 / (3.65 * 2.0));
        assert_relative_eq!(config.tophotons * config.e_per_ph, 1.0);
        assert!(DetectorConfig::new(1, 0.0, 7300.0).is_err());
        assert!(DetectorConfig::new(1, 2.0, f64::NAN).is_err());
    }

    #[test]
    fn test_run_number_of() {
        assert_eq!(run_number_of("/run_42/detector_2d_1/x"), Some(42));
        assert_eq!(run_number_of("run_007/x"), Some(7));
        assert_eq!(run_number_of("/x/run_42"), None);
        assert_eq!(run_number_of("/run_/x"), None);
        assert_eq!(run_number_of("/run_4a/x"), None);
    }

    #[test]
    fn test_resolve_from_run_group() {
        let lookup = DetectorConfigLookup::new(sacla_store().into_shared());
        let config = lookup
            .resolve("/run_42/detector_2d_1/tag_1/detector_data")
            .unwrap();
        assert_eq!(config.run_number, 42);
        assert_relative_eq!(config.absolute_gain, 2.0);
        assert_relative_eq!(config.photon_energy_ev, 7300.0);
        assert_relative_eq!(config.tophotons, 3.65 * 2.0 / 7300.0);
    }

    #[test]
    fn test_resolve_default_run() {
        let mut store = MemoryStore::new("flat").with_default_run(5);
        store
            .insert("/detector_2d_1/tag_1/detector_data", Array2::<f64>::zeros((2, 2)))
            .insert_scalar("/detector_2d_1/detector_info/absolute_gain", 1.0)
            .insert_scalar("/run_info/sacla_config/photon_energy_in_eV", 3.65);
        let lookup = DetectorConfigLookup::new(store.into_shared());
        let config = lookup.resolve("/detector_2d_1/tag_1/detector_data").unwrap();
        assert_eq!(config.run_number, 5);
        assert_relative_eq!(config.tophotons, 1.0);
    }

    #[test]
    fn test_missing_nodes() {
        let mut store = sacla_store();
        store.insert("/run_43/detector_2d_1/tag_1/detector_data", Array2::<f64>::zeros((2, 2)));
        let lookup = DetectorConfigLookup::new(store.into_shared());
        assert!(matches!(
            lookup.resolve("/run_43/detector_2d_1/tag_1/detector_data"),
            Err(Error::ConfigNotFound { run: Some(43), .. })
        ));
        assert!(matches!(
            lookup.resolve("/detector_2d_1/tag_1/detector_data"),
            Err(Error::ConfigNotFound { run: None, .. })
        ));
        assert!(matches!(
            lookup.resolve("/run_42/x"),
            Err(Error::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_cache_reuses_group() {
        let lookup = DetectorConfigLookup::new(sacla_store().into_shared());
        let mut cache = ConfigCache::new(&lookup);
        let a = cache.get("/run_42/detector_2d_1/tag_1/detector_data").unwrap();
        let b = cache.get("/run_42/detector_2d_1/tag_9/detector_data").unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.entries.len(), 1);
    }
}
