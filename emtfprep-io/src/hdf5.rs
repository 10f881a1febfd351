//! HDF5 dataset output.
//!
//! Every named array becomes a root-level dataset with the same shape. The
//! file carries a format version attribute and the array order, so a file
//! read back yields arrays in the order they were written.

use crate::dataset::{ArrayData, Dataset, NamedArray};
use crate::{Error, Result};
use hdf5::types::{FloatSize, H5Type, IntSize, TypeDescriptor, VarLenUnicode};
use hdf5::File;
use ndarray::{ArrayView, IxDyn};
use std::path::Path;
use std::str::FromStr;

const FORMAT_VERSION: &str = "1";
const ORDER_ATTR: &str = "emtfprep_arrays";

/// HDF5 write configuration.
#[derive(Clone, Debug)]
pub struct Hdf5WriteOptions {
    /// Leading-dimension chunk length.
    pub chunk_rows: usize,
    /// Deflate level, if any.
    pub compression: Option<u8>,
    pub shuffle: bool,
}

impl Default for Hdf5WriteOptions {
    fn default() -> Self {
        Self {
            chunk_rows: 65_536,
            compression: Some(1),
            shuffle: true,
        }
    }
}

/// Writer of datasets into an HDF5 file.
pub struct Hdf5DatasetSink {
    file: File,
    options: Hdf5WriteOptions,
}

impl Hdf5DatasetSink {
    /// Create a new HDF5 file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, options: Hdf5WriteOptions) -> Result<Self> {
        let file = File::create(path)?;
        set_attr_str_file(&file, "emtfprep_format_version", FORMAT_VERSION)?;
        Ok(Self { file, options })
    }

    /// Write every array of `dataset`.
    ///
    /// # Errors
    /// Returns an error if HDF5 I/O fails.
    pub fn write(&mut self, dataset: &Dataset) -> Result<()> {
        for array in dataset.iter() {
            match &array.data {
                ArrayData::I32(values) => self.write_array(array, values)?,
                ArrayData::F32(values) => self.write_array(array, values)?,
                ArrayData::I64(values) => self.write_array(array, values)?,
            }
        }
        let order: Vec<&str> = dataset.iter().map(|a| a.name.as_str()).collect();
        set_attr_str_file(&self.file, ORDER_ATTR, &order.join(","))?;
        self.file.flush()?;
        Ok(())
    }

    fn write_array<T: H5Type>(&self, array: &NamedArray, values: &[T]) -> Result<()> {
        let chunk = chunk_shape(&array.shape, self.options.chunk_rows);
        // Filters require a chunked layout.
        let (compression, shuffle) = if chunk.is_some() {
            (self.options.compression, self.options.shuffle)
        } else {
            (None, false)
        };
        let dataset = create_fixed_dataset::<T>(
            &self.file,
            &array.name,
            array.shape.clone(),
            chunk,
            compression,
            shuffle,
        )?;
        if !values.is_empty() {
            let view = ArrayView::from_shape(IxDyn(&array.shape), values)
                .map_err(|e| Error::InvalidFormat(format!("{}: {e}", array.name)))?;
            dataset.write(view)?;
        }
        Ok(())
    }
}

/// Writes `dataset` to a new HDF5 file with default options.
///
/// # Errors
/// Returns an error if HDF5 I/O fails.
pub fn write_hdf5_dataset<P: AsRef<Path>>(path: P, dataset: &Dataset) -> Result<()> {
    Hdf5DatasetSink::create(path, Hdf5WriteOptions::default())?.write(dataset)
}

/// Reads every root-level dataset of an HDF5 file.
///
/// # Errors
/// Returns an error if the file cannot be read or holds an unsupported type.
pub fn read_hdf5_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let file = File::open(path)?;
    let names = match file.attr(ORDER_ATTR) {
        Ok(attr) => {
            let value: VarLenUnicode = attr.read_scalar()?;
            value
                .as_str()
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
        Err(_) => file.member_names()?,
    };

    let mut dataset = Dataset::new();
    for name in names {
        let h5 = file.dataset(&name)?;
        let shape = h5.shape();
        let data = match h5.dtype()?.to_descriptor()? {
            TypeDescriptor::Integer(IntSize::U4) => ArrayData::I32(read_raw_vec(&h5)?),
            TypeDescriptor::Integer(IntSize::U8) => ArrayData::I64(read_raw_vec(&h5)?),
            TypeDescriptor::Float(FloatSize::U4) => ArrayData::F32(read_raw_vec(&h5)?),
            other => {
                return Err(Error::InvalidFormat(format!(
                    "{name}: unsupported element type {other:?}"
                )))
            }
        };
        dataset.insert(NamedArray::new(name, shape, data)?);
    }
    Ok(dataset)
}

fn chunk_shape(shape: &[usize], chunk_rows: usize) -> Option<Vec<usize>> {
    if shape.is_empty() || shape.contains(&0) {
        return None;
    }
    let mut chunk = shape.to_vec();
    chunk[0] = chunk[0].min(chunk_rows.max(1));
    Some(chunk)
}

fn create_fixed_dataset<T: H5Type>(
    file: &File,
    name: &str,
    shape: Vec<usize>,
    chunk: Option<Vec<usize>>,
    compression: Option<u8>,
    shuffle: bool,
) -> Result<hdf5::Dataset> {
    let mut builder = file.new_dataset::<T>().shape(shape);

    if let Some(chunk_shape) = chunk {
        builder = builder.chunk(chunk_shape);
    }

    if let Some(level) = compression {
        builder = builder.deflate(level);
    }

    if shuffle {
        builder = builder.shuffle();
    }

    Ok(builder.create(name)?)
}

fn read_raw_vec<T: H5Type>(dataset: &hdf5::Dataset) -> Result<Vec<T>> {
    if dataset.size() == 0 {
        return Ok(Vec::new());
    }
    Ok(dataset.read_raw::<T>()?)
}

fn set_attr_str_file(file: &File, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    file.new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use emtfprep_core::RaggedArray;
    use tempfile::NamedTempFile;

    #[test]
    fn test_chunk_shape() {
        assert_eq!(chunk_shape(&[10, 18], 4), Some(vec![4, 18]));
        assert_eq!(chunk_shape(&[3], 4), Some(vec![3]));
        assert_eq!(chunk_shape(&[0, 18], 4), None);
    }

    #[test]
    fn test_hdf5_round_trip() {
        let mut dataset = Dataset::new();
        dataset.insert(
            NamedArray::new("out_part", vec![1, 2], ArrayData::F32(vec![20.0, 1.6])).unwrap(),
        );
        let hits = RaggedArray::from_nested(2, [vec![1, 2], vec![], vec![3, 4, 5, 6]]).unwrap();
        dataset.insert_ragged("out_hits", &hits).unwrap();
        let empty = RaggedArray::<i32>::new(2);
        dataset.insert_ragged("out_simhits", &empty).unwrap();

        let file = NamedTempFile::new().unwrap();
        write_hdf5_dataset(file.path(), &dataset).unwrap();

        let loaded = read_hdf5_dataset(file.path()).unwrap();
        assert_eq!(loaded, dataset);
        assert_eq!(loaded.ragged("out_hits").unwrap(), hits);
    }
}
