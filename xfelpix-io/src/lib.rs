//! xfelpix-io: HDF5 store backend for xfelpix.
//!
//! This crate opens SACLA-style HDF5 files as [`xfelpix_core::DatasetStore`]s
//! and writes compressed reduction results back to HDF5. Everything that
//! touches libhdf5 sits behind the `hdf5` feature.
//!

mod error;
#[cfg(feature = "hdf5")]
pub mod hdf5;

pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use self::hdf5::{
    open_store, read_reduction_hdf5, write_reduction_hdf5, Hdf5Opener, Hdf5Store, ReductionData,
    ReductionWriteOptions,
};
