//! emtfprep-io: Event input and dataset output for emtfprep.
//!
//! Events are read from JSON-lines files. Prepared datasets are written as
//! a little-endian binary archive, read back through memory-mapped files
//! via memmap2, or optionally written to HDF5.
//!

mod dataset;
mod error;
mod events;
#[cfg(feature = "hdf5")]
pub mod hdf5;
mod reader;
mod writer;

pub use dataset::{output_file_name, ArrayData, Dataset, NamedArray};
pub use error::{Error, Result};
pub use events::{read_events, EventReader};
#[cfg(feature = "hdf5")]
pub use hdf5::{read_hdf5_dataset, write_hdf5_dataset, Hdf5DatasetSink, Hdf5WriteOptions};
pub use reader::{read_dataset, ArrayEntry, MappedDataset, MappedFileReader};
pub use writer::{write_dataset, DatasetWriter, ARCHIVE_MAGIC, ARCHIVE_VERSION};
