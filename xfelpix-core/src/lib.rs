//! xfelpix-core: dataset stores, pattern matching and dataset selections.
//!
//! This crate provides the foundational abstractions for reducing XFEL
//! detector data: a read interface over hierarchical dataset stores,
//! a small path pattern language, ordered dataset selections with set
//! algebra and grouping, and equal-width histograms.
//!

pub mod error;
pub mod histogram;
pub mod keys;
pub mod pattern;
pub mod selection;
pub mod slicing;
pub mod store;

pub use error::{Error, Result};
pub use histogram::{equal_width_histogram, Histogram, HistogramBins};
pub use keys::{unique_ordered, KeyGroups};
pub use pattern::{is_match, NumericRange, PatternSet};
pub use selection::{DatasetHandle, DatasetSelection, SelectionSource};
pub use slicing::{ArraySlice, SliceSpec};
pub use store::{
    normalize_path, same_store, DatasetStore, MemoryStore, OpenMode, SharedStore, StoreOpener,
};
