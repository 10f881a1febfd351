//! Ragged arrays: variable-length rows of fixed-width records.
//!
//! A [`RaggedArray`] stores all records contiguously in `values` (row-major,
//! `width` scalars per record) and delimits rows with `row_splits`, which has
//! one more entry than there are rows. Row `i` holds records
//! `row_splits[i]..row_splits[i + 1]`. The layout matches the
//! `values`/`row_splits` pair consumed by the training input pipeline.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Append-only ragged array of fixed-width records.
///
/// Deserialization goes through [`RaggedArray::from_parts`], so a decoded
/// array always satisfies the split contract.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RaggedParts<T>"))]
pub struct RaggedArray<T> {
    values: Vec<T>,
    row_splits: Vec<usize>,
    width: usize,
}

/// Unvalidated wire form of a [`RaggedArray`].
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RaggedParts<T> {
    values: Vec<T>,
    row_splits: Vec<usize>,
    width: usize,
}

#[cfg(feature = "serde")]
impl<T> TryFrom<RaggedParts<T>> for RaggedArray<T> {
    type Error = Error;

    fn try_from(parts: RaggedParts<T>) -> Result<Self> {
        Self::from_parts(parts.width, parts.values, parts.row_splits)
    }
}

impl<T> Default for RaggedArray<T> {
    fn default() -> Self {
        Self::new(1)
    }
}

impl<T> RaggedArray<T> {
    /// Creates an empty array with `width` scalars per record.
    ///
    /// Widths less than 1 are clamped to 1.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            values: Vec::new(),
            row_splits: vec![0],
            width: width.max(1),
        }
    }

    /// Creates an empty array with room for `rows` rows and `records` records.
    #[must_use]
    pub fn with_capacity(width: usize, rows: usize, records: usize) -> Self {
        let width = width.max(1);
        let mut row_splits = Vec::with_capacity(rows + 1);
        row_splits.push(0);
        Self {
            values: Vec::with_capacity(records * width),
            row_splits,
            width,
        }
    }

    /// Builds an array from its raw parts, validating the split contract.
    ///
    /// # Errors
    /// Returns [`Error::RaggedLength`] if `values` does not hold whole
    /// records, and [`Error::InvalidRowSplits`] if the splits are empty, do
    /// not start at zero, are not monotone, or do not end at the number of
    /// records in `values`.
    pub fn from_parts(width: usize, values: Vec<T>, row_splits: Vec<usize>) -> Result<Self> {
        let width = width.max(1);
        if values.len() % width != 0 {
            return Err(Error::RaggedLength {
                width,
                len: values.len(),
            });
        }
        match row_splits.first() {
            Some(0) => {}
            Some(first) => {
                return Err(Error::InvalidRowSplits(format!(
                    "first split is {first}, expected 0"
                )))
            }
            None => return Err(Error::InvalidRowSplits("splits are empty".to_string())),
        }
        if let Some(pos) = row_splits.windows(2).position(|w| w[1] < w[0]) {
            return Err(Error::InvalidRowSplits(format!(
                "splits decrease at row {pos}"
            )));
        }
        let records = values.len() / width;
        let last = row_splits[row_splits.len() - 1];
        if last != records {
            return Err(Error::InvalidRowSplits(format!(
                "last split is {last}, expected {records}"
            )));
        }
        Ok(Self {
            values,
            row_splits,
            width,
        })
    }

    /// Splits the array into `(values, row_splits)`.
    #[must_use]
    pub fn into_parts(self) -> (Vec<T>, Vec<usize>) {
        (self.values, self.row_splits)
    }

    /// Scalars per record.
    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Flat record storage.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Row boundaries, in records.
    #[inline]
    #[must_use]
    pub fn row_splits(&self) -> &[usize] {
        &self.row_splits
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.row_splits.len() - 1
    }

    /// Number of records across all rows.
    #[inline]
    #[must_use]
    pub fn num_records(&self) -> usize {
        self.values.len() / self.width
    }

    /// Returns true if the array has no rows.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Record count of each row.
    pub fn row_lengths(&self) -> impl ExactSizeIterator<Item = usize> + '_ {
        self.row_splits.windows(2).map(|w| w[1] - w[0])
    }

    /// Flat scalars of row `index`, borrowed from the array.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[T]> {
        let start = *self.row_splits.get(index)?;
        let end = *self.row_splits.get(index + 1)?;
        Some(&self.values[start * self.width..end * self.width])
    }

    /// Records of row `index`, each a `width`-long slice.
    #[must_use]
    pub fn row_records(&self, index: usize) -> Option<std::slice::ChunksExact<'_, T>> {
        self.row(index).map(|row| row.chunks_exact(self.width))
    }

    /// Iterates rows in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[T]> + '_ {
        self.row_splits
            .windows(2)
            .map(move |w| &self.values[w[0] * self.width..w[1] * self.width])
    }

    /// Record index to row index map (one entry per record).
    #[must_use]
    pub fn segment_ids(&self) -> Vec<usize> {
        let mut ids = Vec::with_capacity(self.num_records());
        for (row, len) in self.row_lengths().enumerate() {
            ids.extend(std::iter::repeat(row).take(len));
        }
        ids
    }

    fn check_width(&self, other_width: usize) -> Result<()> {
        if other_width == self.width {
            Ok(())
        } else {
            Err(Error::RaggedWidth {
                expected: self.width,
                actual: other_width,
            })
        }
    }

    fn push_split(&mut self, records: usize) {
        let last = self.row_splits[self.row_splits.len() - 1];
        self.row_splits.push(last + records);
    }
}

impl<T: Copy> RaggedArray<T> {
    /// Builds an array from nested rows of flat scalars in a single pass.
    ///
    /// Produces exactly the same `values` and `row_splits` as calling
    /// [`Self::append_row`] once per row.
    ///
    /// # Errors
    /// Returns an error if any row length is not a multiple of `width`.
    pub fn from_nested<I, R>(width: usize, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[T]>,
    {
        let width = width.max(1);
        let rows = rows.into_iter();
        let mut values = Vec::new();
        let mut row_splits = Vec::with_capacity(rows.size_hint().0 + 1);
        row_splits.push(0);
        for row in rows {
            let row = row.as_ref();
            if row.len() % width != 0 {
                return Err(Error::RaggedLength {
                    width,
                    len: row.len(),
                });
            }
            values.extend_from_slice(row);
            row_splits.push(values.len() / width);
        }
        Ok(Self {
            values,
            row_splits,
            width,
        })
    }

    /// Appends one row given as flat scalars.
    ///
    /// # Errors
    /// Returns an error if `row.len()` is not a multiple of the width.
    pub fn append_row(&mut self, row: &[T]) -> Result<()> {
        if row.len() % self.width != 0 {
            return Err(Error::RaggedLength {
                width: self.width,
                len: row.len(),
            });
        }
        self.values.extend_from_slice(row);
        self.push_split(row.len() / self.width);
        Ok(())
    }

    /// Appends one row of `W`-wide records.
    ///
    /// # Errors
    /// Returns an error if `W` differs from the array width.
    pub fn append_records<const W: usize>(&mut self, records: &[[T; W]]) -> Result<()> {
        self.check_width(W)?;
        self.values.extend_from_slice(records.as_flattened());
        self.push_split(records.len());
        Ok(())
    }

    /// Appends every row of `other`, preserving order.
    ///
    /// # Errors
    /// Returns an error if the widths differ.
    pub fn concat(&mut self, other: &Self) -> Result<()> {
        self.check_width(other.width)?;
        let offset = self.row_splits[self.row_splits.len() - 1];
        self.values.extend_from_slice(&other.values);
        self.row_splits
            .extend(other.row_splits[1..].iter().map(|split| split + offset));
        Ok(())
    }

    /// Concatenates several arrays of the same width into a new one.
    ///
    /// # Errors
    /// Returns an error if any part has a different width.
    pub fn stack<'a, I>(width: usize, parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Self>,
        T: 'a,
    {
        let mut array = Self::new(width);
        for part in parts {
            array.concat(part)?;
        }
        Ok(array)
    }

    /// Keeps the records whose entry in `mask` is true; row count is unchanged.
    ///
    /// # Errors
    /// Returns an error if `mask` does not have one entry per record.
    pub fn boolean_mask(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.num_records() {
            return Err(Error::InvalidRowSplits(format!(
                "mask has {} entries, expected {}",
                mask.len(),
                self.num_records()
            )));
        }
        let mut array = Self::with_capacity(self.width, self.num_rows(), self.num_records());
        for w in self.row_splits.windows(2) {
            let mut kept = 0;
            for record in w[0]..w[1] {
                if mask[record] {
                    let start = record * self.width;
                    array
                        .values
                        .extend_from_slice(&self.values[start..start + self.width]);
                    kept += 1;
                }
            }
            array.push_split(kept);
        }
        Ok(array)
    }

    /// Keeps the rows whose entry in `mask` is true.
    ///
    /// # Errors
    /// Returns an error if `mask` does not have one entry per row.
    pub fn row_mask(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.num_rows() {
            return Err(Error::InvalidRowSplits(format!(
                "row mask has {} entries, expected {}",
                mask.len(),
                self.num_rows()
            )));
        }
        let mut array = Self::new(self.width);
        for (row, _) in self.iter().zip(mask).filter(|(_, &keep)| keep) {
            array.append_row(row)?;
        }
        Ok(array)
    }

    /// Copies the rows out into nested vectors.
    #[must_use]
    pub fn to_nested(&self) -> Vec<Vec<T>> {
        self.iter().map(<[T]>::to_vec).collect()
    }
}

/// Builds row splits from a per-record row index.
///
/// `segment_ids` need not be sorted; each row's length is the number of
/// records naming it. `num_rows` pads trailing empty rows.
#[must_use]
pub fn row_splits_from_segment_ids(segment_ids: &[usize], num_rows: Option<usize>) -> Vec<usize> {
    let rows = segment_ids
        .iter()
        .map(|&id| id + 1)
        .max()
        .unwrap_or(0)
        .max(num_rows.unwrap_or(0));
    let mut lengths = vec![0usize; rows];
    for &id in segment_ids {
        lengths[id] += 1;
    }
    let mut splits = Vec::with_capacity(rows + 1);
    splits.push(0);
    for len in lengths {
        splits.push(splits[splits.len() - 1] + len);
    }
    splits
}
