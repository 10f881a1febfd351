//! Named numeric arrays written by the preparations.
#![allow(clippy::cast_possible_wrap)]

use crate::{Error, Result};
use emtfprep_algorithms::{BackgroundOutput, SignalOutput, NUM_AUX_FIELDS, NUM_PART_FIELDS};
use emtfprep_core::RaggedArray;

/// Element storage of a named array.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayData {
    I32(Vec<i32>),
    F32(Vec<f32>),
    I64(Vec<i64>),
}

impl ArrayData {
    /// Type code used by the archive format.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Self::I32(_) => 0,
            Self::F32(_) => 1,
            Self::I64(_) => 2,
        }
    }

    /// Element type name.
    #[must_use]
    pub fn dtype(&self) -> &'static str {
        match self {
            Self::I32(_) => "int32",
            Self::F32(_) => "float32",
            Self::I64(_) => "int64",
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::I32(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::I64(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named, shaped array.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedArray {
    pub name: String,
    /// Row-major shape; its product equals the element count.
    pub shape: Vec<usize>,
    pub data: ArrayData,
}

impl NamedArray {
    /// Creates an array, checking the shape against the element count.
    ///
    /// # Errors
    /// Returns an error if the shape does not match the data.
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: ArrayData) -> Result<Self> {
        let name = name.into();
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::InvalidFormat(format!(
                "{name}: shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        Ok(Self { name, shape, data })
    }
}

/// Ordered collection of named arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    arrays: Vec<NamedArray>,
}

impl Dataset {
    /// Creates an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an array, replacing any array of the same name.
    pub fn insert(&mut self, array: NamedArray) {
        if let Some(slot) = self.arrays.iter_mut().find(|a| a.name == array.name) {
            *slot = array;
        } else {
            self.arrays.push(array);
        }
    }

    /// Appends `<prefix>_values` (records x width) and `<prefix>_row_splits`.
    ///
    /// # Errors
    /// Returns an error if the ragged array is internally inconsistent.
    pub fn insert_ragged(&mut self, prefix: &str, ragged: &RaggedArray<i32>) -> Result<()> {
        let values = NamedArray::new(
            format!("{prefix}_values"),
            vec![ragged.num_records(), ragged.width()],
            ArrayData::I32(ragged.values().to_vec()),
        )?;
        let splits = ragged.row_splits().iter().map(|&s| s as i64).collect();
        let row_splits = NamedArray::new(
            format!("{prefix}_row_splits"),
            vec![ragged.row_splits().len()],
            ArrayData::I64(splits),
        )?;
        self.insert(values);
        self.insert(row_splits);
        Ok(())
    }

    /// Rebuilds the ragged array stored under `prefix`.
    ///
    /// # Errors
    /// Returns an error if either array is missing, has the wrong type, or
    /// the splits violate the ragged contract.
    pub fn ragged(&self, prefix: &str) -> Result<RaggedArray<i32>> {
        let values = self.require(&format!("{prefix}_values"))?;
        let splits = self.require(&format!("{prefix}_row_splits"))?;
        let width = values.shape.get(1).copied().unwrap_or(1);
        let ArrayData::I32(data) = &values.data else {
            return Err(dtype_mismatch(values, "int32"));
        };
        let ArrayData::I64(raw_splits) = &splits.data else {
            return Err(dtype_mismatch(splits, "int64"));
        };
        let row_splits = raw_splits
            .iter()
            .map(|&s| usize::try_from(s))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::InvalidFormat(format!("{prefix}: negative row split")))?;
        Ok(RaggedArray::from_parts(width, data.clone(), row_splits)?)
    }

    /// Array by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NamedArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    /// Arrays in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &NamedArray> {
        self.arrays.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    fn require(&self, name: &str) -> Result<&NamedArray> {
        self.get(name)
            .ok_or_else(|| Error::MissingArray(name.to_string()))
    }

    /// Dataset of a signal run: `out_part`, `out_hits_*`, `out_simhits_*`.
    ///
    /// # Errors
    /// Returns an error if any output array is inconsistent.
    pub fn from_signal(output: &SignalOutput) -> Result<Self> {
        let mut dataset = Self::new();
        dataset.insert(NamedArray::new(
            "out_part",
            vec![output.part.len(), NUM_PART_FIELDS],
            ArrayData::F32(output.part.as_flattened().to_vec()),
        )?);
        dataset.insert_ragged("out_hits", &output.hits)?;
        dataset.insert_ragged("out_simhits", &output.simhits)?;
        Ok(dataset)
    }

    /// Dataset of a background run: `out_aux`, `out_hits_*`.
    ///
    /// # Errors
    /// Returns an error if any output array is inconsistent.
    pub fn from_background(output: &BackgroundOutput) -> Result<Self> {
        let mut dataset = Self::new();
        dataset.insert(NamedArray::new(
            "out_aux",
            vec![output.aux.len(), NUM_AUX_FIELDS],
            ArrayData::I32(output.aux.as_flattened().to_vec()),
        )?);
        dataset.insert_ragged("out_hits", &output.hits)?;
        Ok(dataset)
    }
}

fn dtype_mismatch(array: &NamedArray, expected: &'static str) -> Error {
    Error::DtypeMismatch {
        name: array.name.clone(),
        expected,
        actual: array.data.dtype(),
    }
}

/// Output file name: `<stem>.<ext>`, or `<stem>_<job>.<ext>` for batch jobs.
#[must_use]
pub fn output_file_name(stem: &str, job_id: Option<i32>, extension: &str) -> String {
    match job_id {
        Some(job) => format!("{stem}_{job}.{extension}"),
        None => format!("{stem}.{extension}"),
    }
}
