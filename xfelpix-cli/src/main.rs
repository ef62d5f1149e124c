//! xfelpix CLI: dataset listing, detector configuration and frame reduction.
//!
//! This binary is a thin shell over the xfelpix libraries for HDF5 files.
#![allow(clippy::cast_precision_loss, clippy::too_many_lines)]

use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use xfelpix_core::{ArraySlice, DatasetSelection, SharedStore, SliceSpec};
use xfelpix_frames::{
    Background, CorrectionConfig, DetectorConfigLookup, DetectorLayout, FramePipeline, Reducer,
    Roi, Threshold, DEFAULT_FRAME_PATTERN,
};
use xfelpix_io::{open_store, write_reduction_hdf5, ReductionData, ReductionWriteOptions};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    XfelpixIo(#[from] xfelpix_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] xfelpix_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Reduction applied to the selected frames.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReduceKind {
    /// Mean image
    Mean,
    /// Summed image
    Sum,
    /// Sum of all pixels, one value
    Total,
}

impl From<ReduceKind> for Reducer {
    fn from(kind: ReduceKind) -> Self {
        match kind {
            ReduceKind::Mean => Reducer::Mean,
            ReduceKind::Sum => Reducer::Sum,
            ReduceKind::Total => Reducer::Total,
        }
    }
}

/// Selection, correction and compression of XFEL detector frames.
#[derive(Parser)]
#[command(name = "xfelpix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List datasets matching a pattern
    Ls {
        /// Input HDF5 file
        input: PathBuf,

        /// Pattern, e.g. "tag_<100-200> detector_data$"
        #[arg(default_value = "")]
        pattern: String,

        /// Only list datasets below this group
        #[arg(long)]
        subtree: Option<String>,

        /// Print dataset shapes
        #[arg(long)]
        shape: bool,
    },

    /// Print the detector configuration of a frame dataset as JSON
    Config {
        /// Input HDF5 file
        input: PathBuf,

        /// Frame dataset path
        dataset: String,

        /// Gain node relative to the detector group
        #[arg(long)]
        gain_path: Option<String>,

        /// Photon energy node relative to the run group
        #[arg(long)]
        energy_path: Option<String>,
    },

    /// Correct frames and write the reduced result
    Reduce {
        /// Input HDF5 file
        input: PathBuf,

        /// Output HDF5 file
        #[arg(short, long)]
        output: PathBuf,

        /// Frame pattern
        #[arg(short, long, default_value = DEFAULT_FRAME_PATTERN)]
        pattern: String,

        /// Region of interest as "rows,cols", e.g. "100:400,:"
        #[arg(long)]
        roi: Option<String>,

        /// Keep detector units instead of photon counts
        #[arg(long)]
        raw: bool,

        /// Dataset holding a fixed background image
        #[arg(long, conflicts_with_all = ["background_frames", "background_value"])]
        background: Option<String>,

        /// Pattern of per-frame background datasets, matched in lockstep
        #[arg(long, conflicts_with = "background_value")]
        background_frames: Option<String>,

        /// Constant background
        #[arg(long)]
        background_value: Option<f64>,

        /// Values below become zero
        #[arg(long, allow_hyphen_values = true)]
        threshold_lo: Option<f64>,

        /// Values above become zero
        #[arg(long, allow_hyphen_values = true)]
        threshold_hi: Option<f64>,

        /// Reduction
        #[arg(short, long, value_enum, default_value = "mean")]
        reducer: ReduceKind,

        /// 1D dataset with one key per frame; frames are reduced per key
        #[arg(short, long)]
        keys: Option<String>,

        /// Also store the pixel histogram with this many bins
        #[arg(long)]
        histogram: Option<usize>,

        /// Deflate level of the output, 0 to disable
        #[arg(long, default_value = "4")]
        compression: u8,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Ls {
            input,
            pattern,
            subtree,
            shape,
        } => {
            let store = open_store(&input, xfelpix_core::OpenMode::Read)?;
            let selection =
                DatasetSelection::from_store(SharedStore::clone(&store), &pattern, subtree.as_deref())?;
            for handle in selection.iter() {
                if shape {
                    println!("{}\t{:?}", handle.path(), handle.shape()?);
                } else {
                    println!("{}", handle.path());
                }
            }
            info!("{} datasets", selection.len());
        }

        Commands::Config {
            input,
            dataset,
            gain_path,
            energy_path,
        } => {
            let store = open_store(&input, xfelpix_core::OpenMode::Read)?;
            let layout = custom_layout(gain_path, energy_path);
            let lookup = DetectorConfigLookup::new(store).with_layout(layout);
            let config = lookup.resolve(&dataset)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::Reduce {
            input,
            output,
            pattern,
            roi,
            raw,
            background,
            background_frames,
            background_value,
            threshold_lo,
            threshold_hi,
            reducer,
            keys,
            histogram,
            compression,
        } => {
            let start = Instant::now();
            let store = open_store(&input, xfelpix_core::OpenMode::Read)?;
            let selection =
                DatasetSelection::from_store(SharedStore::clone(&store), &pattern, None)?;
            if selection.is_empty() {
                return Err(CliError::InvalidArgument(format!(
                    "no dataset of {} matches {pattern:?}",
                    input.display()
                )));
            }

            let mut config = CorrectionConfig::default()
                .with_normalize(!raw)
                .with_threshold(Threshold::new(threshold_lo, threshold_hi));
            if let Some(roi) = roi {
                config = config.with_roi(parse_roi(&roi)?);
            }
            debug!("correction: {}", serde_json::to_string(&config)?);

            let mut pipeline = FramePipeline::new(selection).with_config(config.clone());
            if let Some(path) = background {
                let image = store
                    .read_array(&path, &ArraySlice::full())?
                    .into_dimensionality()
                    .map_err(|_| {
                        CliError::InvalidArgument(format!("background {path} is not 2D"))
                    })?;
                pipeline.set_background(Background::Fixed(image));
            } else if let Some(pattern) = background_frames {
                let frames = DatasetSelection::from_store(SharedStore::clone(&store), &pattern, None)?;
                let frames = FramePipeline::new(frames).with_config(config);
                pipeline.set_background(frames);
            } else if let Some(value) = background_value {
                pipeline.set_background(value);
            }

            let reducer = Reducer::from(reducer);
            let mut result = match keys {
                Some(path) => {
                    let keys = read_vec(&store, &path)?;
                    let compressed = pipeline.compress_by_key(&keys, &reducer, None)?;
                    let counts = pipeline
                        .group_by_keys(&keys)?
                        .iter()
                        .map(|(_, group)| group.len() as f64)
                        .collect();
                    ReductionData::new(compressed.data)
                        .with_keys(compressed.keys)
                        .with_extra("frames_per_key", counts)
                }
                None => ReductionData::new(reducer.apply(&pipeline)?),
            };

            if let Some(count) = histogram {
                let bins = pipeline.histogram_bins()?;
                pipeline.set_histogram_bins(bins.lo, bins.hi, count)?;
                let histogram = pipeline.histogram()?;
                result = result
                    .with_extra(
                        "histogram_counts",
                        histogram.counts.iter().map(|&c| c as f64).collect(),
                    )
                    .with_extra("histogram_edges", histogram.edges);
            }

            let options = ReductionWriteOptions {
                compression: (compression > 0).then_some(compression),
                source: Some(input.display().to_string()),
                ..ReductionWriteOptions::default()
            };
            write_reduction_hdf5(&output, &result, &options)?;

            println!(
                "Reduced {} frames in {:.2}s",
                pipeline.len(),
                start.elapsed().as_secs_f64()
            );
            println!("Output: {} {:?}", output.display(), result.data.shape());
        }
    }

    Ok(())
}

fn custom_layout(gain_path: Option<String>, energy_path: Option<String>) -> DetectorLayout {
    let mut layout = DetectorLayout::default();
    if let Some(path) = gain_path {
        layout = layout.with_gain_path(path);
    }
    if let Some(path) = energy_path {
        layout = layout.with_energy_path(path);
    }
    layout
}

fn read_vec(store: &SharedStore, path: &str) -> Result<Vec<f64>> {
    let data = store.read_array(path, &ArraySlice::full())?;
    if data.ndim() > 1 {
        return Err(CliError::InvalidArgument(format!(
            "{path} has shape {:?}, expected one value per frame",
            data.shape()
        )));
    }
    Ok(data.iter().copied().collect())
}

/// Parses "rows,cols" where each part is a `start:stop[:step]` slice.
fn parse_roi(text: &str) -> Result<Roi> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let [rows, cols] = parts.as_slice() else {
        return Err(CliError::InvalidArgument(format!(
            "ROI {text:?} must have the form rows,cols"
        )));
    };
    Ok(Roi::new(parse_slice(rows)?, parse_slice(cols)?))
}

fn parse_slice(text: &str) -> Result<SliceSpec> {
    let invalid = || CliError::InvalidArgument(format!("invalid slice {text:?}"));
    let bound = |part: &str| -> Result<Option<isize>> {
        let part = part.trim();
        if part.is_empty() {
            Ok(None)
        } else {
            part.parse().map(Some).map_err(|_| invalid())
        }
    };
    let parts: Vec<&str> = text.split(':').collect();
    let spec = match parts.as_slice() {
        [single] if !single.trim().is_empty() => {
            let index = bound(single)?.ok_or_else(invalid)?;
            let stop = if index == -1 { None } else { Some(index + 1) };
            SliceSpec::new(Some(index), stop, 1)
        }
        [start, stop] => SliceSpec::new(bound(start)?, bound(stop)?, 1),
        [start, stop, step] => {
            let step = bound(step)?.unwrap_or(1);
            if step == 0 {
                return Err(invalid());
            }
            SliceSpec::new(bound(start)?, bound(stop)?, step)
        }
        _ => return Err(invalid()),
    };
    Ok(spec)
}
