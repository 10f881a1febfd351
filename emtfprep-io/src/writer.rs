//! Dataset archive writer.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic    8 bytes  "EMTFPREP"
//! version  u32
//! count    u32      number of arrays
//! per array:
//!   name_len u16, name (utf-8)
//!   dtype    u8     0 = i32, 1 = f32, 2 = i64
//!   ndim     u8
//!   shape    ndim x u64
//!   data     product(shape) elements
//! ```

use crate::dataset::{ArrayData, Dataset, NamedArray};
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Archive magic bytes.
pub const ARCHIVE_MAGIC: &[u8; 8] = b"EMTFPREP";

/// Archive format version.
pub const ARCHIVE_VERSION: u32 = 1;

/// Writer for dataset archives.
pub struct DatasetWriter<W: Write> {
    writer: W,
}

impl DatasetWriter<BufWriter<File>> {
    /// Creates a new archive file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> DatasetWriter<W> {
    /// Wraps any writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a complete archive and flushes.
    ///
    /// # Errors
    /// Returns an error if a name or shape cannot be encoded, or on I/O failure.
    pub fn write(&mut self, dataset: &Dataset) -> Result<()> {
        let count = u32::try_from(dataset.len())
            .map_err(|_| Error::InvalidFormat("too many arrays".to_string()))?;
        self.writer.write_all(ARCHIVE_MAGIC)?;
        self.writer.write_all(&ARCHIVE_VERSION.to_le_bytes())?;
        self.writer.write_all(&count.to_le_bytes())?;
        for array in dataset.iter() {
            self.write_array(array)?;
        }
        self.flush()
    }

    fn write_array(&mut self, array: &NamedArray) -> Result<()> {
        let name_len = u16::try_from(array.name.len())
            .map_err(|_| Error::InvalidFormat(format!("array name too long: {}", array.name)))?;
        let ndim = u8::try_from(array.shape.len())
            .map_err(|_| Error::InvalidFormat(format!("{}: too many dimensions", array.name)))?;

        self.writer.write_all(&name_len.to_le_bytes())?;
        self.writer.write_all(array.name.as_bytes())?;
        self.writer.write_all(&[array.data.code(), ndim])?;
        for &dim in &array.shape {
            self.writer.write_all(&(dim as u64).to_le_bytes())?;
        }

        match &array.data {
            ArrayData::I32(values) => {
                for v in values {
                    self.writer.write_all(&v.to_le_bytes())?;
                }
            }
            ArrayData::F32(values) => {
                for v in values {
                    self.writer.write_all(&v.to_le_bytes())?;
                }
            }
            ArrayData::I64(values) => {
                for v in values {
                    self.writer.write_all(&v.to_le_bytes())?;
                }
            }
        }
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error on I/O failure.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Writes `dataset` to a new archive at `path`.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_dataset<P: AsRef<Path>>(path: P, dataset: &Dataset) -> Result<()> {
    DatasetWriter::create(path)?.write(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_layout() {
        let mut dataset = Dataset::new();
        dataset.insert(NamedArray::new("ab", vec![2], ArrayData::I32(vec![1, -1])).unwrap());

        let mut writer = DatasetWriter::new(Vec::new());
        writer.write(&dataset).unwrap();
        let bytes = writer.into_inner();

        // header 16 + name_len 2 + name 2 + dtype/ndim 2 + shape 8 + data 8
        assert_eq!(bytes.len(), 38);
        assert_eq!(&bytes[..8], ARCHIVE_MAGIC);
        assert_eq!(&bytes[8..12], &1u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1u32.to_le_bytes());
        assert_eq!(&bytes[18..20], b"ab");
        assert_eq!(&bytes[30..34], &1i32.to_le_bytes());
        assert_eq!(&bytes[34..38], &(-1i32).to_le_bytes());
    }
}
