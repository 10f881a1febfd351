//! Memory-mapped dataset archive reader.

use crate::dataset::{ArrayData, Dataset, NamedArray};
use crate::writer::{ARCHIVE_MAGIC, ARCHIVE_VERSION};
use crate::{Error, Result};
use emtfprep_core::RaggedArray;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Location of one array inside an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayEntry {
    pub name: String,
    pub dtype: &'static str,
    pub shape: Vec<usize>,
    code: u8,
    offset: usize,
    len: usize,
}

impl ArrayEntry {
    /// Number of elements.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

/// An archive opened for random access by array name.
pub struct MappedDataset {
    reader: MappedFileReader,
    entries: Vec<ArrayEntry>,
}

impl MappedDataset {
    /// Opens an archive and indexes its arrays.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped or is not a valid archive.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = MappedFileReader::open(path)?;
        let entries = index_archive(reader.as_bytes())?;
        log::debug!(
            "{}: {} arrays, {} bytes",
            reader.path().display(),
            entries.len(),
            reader.len()
        );
        Ok(Self { reader, entries })
    }

    /// Array entries in file order.
    #[must_use]
    pub fn entries(&self) -> &[ArrayEntry] {
        &self.entries
    }

    /// Array names in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Entry by name.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&ArrayEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Decodes one array.
    ///
    /// # Errors
    /// Returns an error if no array has this name.
    pub fn array(&self, name: &str) -> Result<NamedArray> {
        let entry = self
            .entry(name)
            .ok_or_else(|| Error::MissingArray(name.to_string()))?;
        self.decode(entry)
    }

    /// Reads an int32 array.
    ///
    /// # Errors
    /// Returns an error if the array is missing or not int32.
    pub fn read_i32(&self, name: &str) -> Result<Vec<i32>> {
        match self.array(name)? {
            NamedArray {
                data: ArrayData::I32(values),
                ..
            } => Ok(values),
            other => Err(mismatch(&other, "int32")),
        }
    }

    /// Reads a float32 array.
    ///
    /// # Errors
    /// Returns an error if the array is missing or not float32.
    pub fn read_f32(&self, name: &str) -> Result<Vec<f32>> {
        match self.array(name)? {
            NamedArray {
                data: ArrayData::F32(values),
                ..
            } => Ok(values),
            other => Err(mismatch(&other, "float32")),
        }
    }

    /// Reads an int64 array.
    ///
    /// # Errors
    /// Returns an error if the array is missing or not int64.
    pub fn read_i64(&self, name: &str) -> Result<Vec<i64>> {
        match self.array(name)? {
            NamedArray {
                data: ArrayData::I64(values),
                ..
            } => Ok(values),
            other => Err(mismatch(&other, "int64")),
        }
    }

    /// Rebuilds the ragged array stored under `prefix`.
    ///
    /// # Errors
    /// Returns an error if the arrays are missing or inconsistent.
    pub fn ragged(&self, prefix: &str) -> Result<RaggedArray<i32>> {
        let mut dataset = Dataset::new();
        dataset.insert(self.array(&format!("{prefix}_values"))?);
        dataset.insert(self.array(&format!("{prefix}_row_splits"))?);
        dataset.ragged(prefix)
    }

    /// Decodes every array into an in-memory dataset.
    ///
    /// # Errors
    /// Returns an error if any array fails to decode.
    pub fn to_dataset(&self) -> Result<Dataset> {
        let mut dataset = Dataset::new();
        for entry in &self.entries {
            dataset.insert(self.decode(entry)?);
        }
        Ok(dataset)
    }

    fn decode(&self, entry: &ArrayEntry) -> Result<NamedArray> {
        let bytes = &self.reader.as_bytes()[entry.offset..entry.offset + entry.len];
        let data = match entry.code {
            0 => ArrayData::I32(
                bytes
                    .chunks_exact(4)
                    .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            ),
            1 => ArrayData::F32(
                bytes
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            ),
            _ => ArrayData::I64(
                bytes
                    .chunks_exact(8)
                    .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                    .collect(),
            ),
        };
        NamedArray::new(entry.name.clone(), entry.shape.clone(), data)
    }
}

/// Reads a whole archive into memory.
///
/// # Errors
/// Returns an error if the file is not a valid archive.
pub fn read_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    MappedDataset::open(path)?.to_dataset()
}

fn mismatch(array: &NamedArray, expected: &'static str) -> Error {
    Error::DtypeMismatch {
        name: array.name.clone(),
        expected,
        actual: array.data.dtype(),
    }
}

/// Bounds-checked little-endian cursor over the mapped bytes.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| Error::InvalidFormat(format!("truncated archive at byte {}", self.pos)))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}

fn index_archive(bytes: &[u8]) -> Result<Vec<ArrayEntry>> {
    let mut cursor = Cursor { bytes, pos: 0 };
    if cursor.take(ARCHIVE_MAGIC.len()).ok() != Some(&ARCHIVE_MAGIC[..]) {
        return Err(Error::InvalidFormat("not a dataset archive".to_string()));
    }
    let version = cursor.u32()?;
    if version != ARCHIVE_VERSION {
        return Err(Error::InvalidFormat(format!(
            "unsupported archive version {version}"
        )));
    }
    let count = cursor.u32()?;

    let mut entries = Vec::new();
    for _ in 0..count {
        let name_len = usize::from(cursor.u16()?);
        let name = std::str::from_utf8(cursor.take(name_len)?)
            .map_err(|e| Error::InvalidFormat(format!("array name: {e}")))?
            .to_string();
        let code = cursor.u8()?;
        let (dtype, item_size) = match code {
            0 => ("int32", 4),
            1 => ("float32", 4),
            2 => ("int64", 8),
            other => {
                return Err(Error::InvalidFormat(format!(
                    "{name}: unknown dtype code {other}"
                )))
            }
        };
        let ndim = cursor.u8()?;
        let shape = (0..ndim)
            .map(|_| {
                let dim = cursor.u64()?;
                usize::try_from(dim)
                    .map_err(|_| Error::InvalidFormat(format!("{name}: dimension {dim} too large")))
            })
            .collect::<Result<Vec<_>>>()?;
        let len = shape
            .iter()
            .try_fold(item_size, |acc: usize, &d| acc.checked_mul(d))
            .ok_or_else(|| Error::InvalidFormat(format!("{name}: shape overflows")))?;
        let offset = cursor.pos;
        cursor.take(len)?;
        entries.push(ArrayEntry {
            name,
            dtype,
            shape,
            code,
            offset,
            len,
        });
    }
    Ok(entries)
}
