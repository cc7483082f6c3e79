//! In-memory embedding store.
//!
//! Holds one embedding per student in a dense row-major `N × D` buffer and
//! answers "how similar is row `i` to every row" queries with cosine
//! similarity. The store is built once at startup and never mutated, so it
//! can be shared across threads behind an `Arc` without locking.
//!
//! Two on-disk formats are accepted, chosen by file extension:
//!
//! - `.npy` - a 2-D C-order NumPy array of `<f4` or `<f8`
//! - anything else - a JSON array of equal-length numeric arrays

use crate::error::{FriendRecError, Result};
use crate::similarity::{cosine_with_norms, l2_norm};
use anyhow::{Context, ensure};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

const NPY_MAGIC: [u8; 6] = *b"\x93NUMPY";
const NPY_V1_PREFIX_LEN: usize = 10;
const NPY_V2_PREFIX_LEN: usize = 12;

/// Stores at least this large compute similarities on the rayon pool.
pub const PARALLEL_THRESHOLD: usize = 4096;

/// Element type of an NPY payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NpyDtype {
    F32,
    F64,
}

impl NpyDtype {
    const fn size(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct NpyHeader {
    dtype: NpyDtype,
    rows: usize,
    cols: usize,
    data_start: usize,
}

fn parse_npy_header(bytes: &[u8]) -> anyhow::Result<NpyHeader> {
    ensure!(bytes.len() >= NPY_V1_PREFIX_LEN, "npy header truncated");
    ensure!(bytes[0..6] == NPY_MAGIC, "npy magic mismatch");

    let major = bytes[6];
    let (header_len, prefix_len) = match major {
        1 => (
            usize::from(u16::from_le_bytes([bytes[8], bytes[9]])),
            NPY_V1_PREFIX_LEN,
        ),
        2 | 3 => {
            ensure!(bytes.len() >= NPY_V2_PREFIX_LEN, "npy header truncated");
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (
                usize::try_from(len).map_err(|_| anyhow::anyhow!("npy header length overflow"))?,
                NPY_V2_PREFIX_LEN,
            )
        }
        other => anyhow::bail!("unsupported npy format version {other}"),
    };

    let data_start = prefix_len
        .checked_add(header_len)
        .ok_or_else(|| anyhow::anyhow!("npy header length overflow"))?;
    ensure!(data_start <= bytes.len(), "npy header exceeds file length");

    let header = std::str::from_utf8(&bytes[prefix_len..data_start])
        .map_err(|_| anyhow::anyhow!("npy header is not valid text"))?;

    let descr = dict_value(header, "descr")
        .and_then(quoted_string)
        .ok_or_else(|| anyhow::anyhow!("npy header missing 'descr'"))?;
    let dtype = match descr {
        "<f4" => NpyDtype::F32,
        "<f8" => NpyDtype::F64,
        other => anyhow::bail!("unsupported npy dtype '{other}' (expected '<f4' or '<f8')"),
    };

    let fortran_order = dict_value(header, "fortran_order")
        .ok_or_else(|| anyhow::anyhow!("npy header missing 'fortran_order'"))?;
    ensure!(
        fortran_order.starts_with("False"),
        "fortran-ordered npy arrays are not supported"
    );

    let shape = dict_value(header, "shape")
        .and_then(parse_shape)
        .ok_or_else(|| anyhow::anyhow!("npy header has no readable 'shape'"))?;
    ensure!(
        shape.len() == 2,
        "expected a 2-D array of embeddings, found {} dimension(s)",
        shape.len()
    );

    Ok(NpyHeader {
        dtype,
        rows: shape[0],
        cols: shape[1],
        data_start,
    })
}

/// Text following `'key':` in a Python dict literal.
fn dict_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{key}':");
    let start = header.find(&needle)? + needle.len();
    Some(header[start..].trim_start())
}

fn quoted_string(value: &str) -> Option<&str> {
    let quote = value.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &value[1..];
    rest.find(quote).map(|end| &rest[..end])
}

fn parse_shape(value: &str) -> Option<Vec<usize>> {
    let inner = value.strip_prefix('(')?;
    let inner = &inner[..inner.find(')')?];
    inner
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().ok())
        .collect()
}

fn decode_npy(bytes: &[u8]) -> anyhow::Result<(Vec<f32>, usize)> {
    let header = parse_npy_header(bytes)?;

    let expected = header
        .rows
        .checked_mul(header.cols)
        .and_then(|n| n.checked_mul(header.dtype.size()))
        .ok_or_else(|| anyhow::anyhow!("npy payload size overflow"))?;
    let payload = &bytes[header.data_start..];
    ensure!(
        payload.len() == expected,
        "npy payload is {} bytes, shape ({}, {}) needs {expected}",
        payload.len(),
        header.rows,
        header.cols
    );

    let data = match header.dtype {
        NpyDtype::F32 => payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        #[allow(clippy::cast_possible_truncation)]
        NpyDtype::F64 => payload
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32)
            .collect(),
    };

    Ok((data, header.cols))
}

fn decode_json(bytes: &[u8]) -> anyhow::Result<(Vec<f32>, usize)> {
    let rows: Vec<Vec<f32>> =
        serde_json::from_slice(bytes).context("expected a JSON array of numeric arrays")?;
    flatten_rows(rows)
}

fn flatten_rows(rows: Vec<Vec<f32>>) -> anyhow::Result<(Vec<f32>, usize)> {
    let dimension = rows.first().map_or(0, Vec::len);
    let mut data = Vec::with_capacity(rows.len() * dimension);
    for (i, row) in rows.into_iter().enumerate() {
        ensure!(
            row.len() == dimension,
            "row {i} has dimension {}, expected {dimension}",
            row.len()
        );
        data.extend(row);
    }
    Ok((data, dimension))
}

/// Summary statistics over the stored vectors.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub users: usize,
    pub dimension: usize,
    pub zero_norm_rows: usize,
    pub min_norm: f32,
    pub mean_norm: f32,
    pub max_norm: f32,
}

/// Dense, immutable collection of user embeddings.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    /// Row-major `len × dimension` values.
    data: Vec<f32>,
    /// L2 norm of each row.
    norms: Vec<f32>,
    dimension: usize,
}

impl EmbeddingStore {
    /// Load embeddings from a `.npy` or JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`FriendRecError::StoreLoad`] if the file is missing, cannot be
    /// decoded, has ragged rows or non-finite values, or holds no vectors.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| FriendRecError::store_load(path, e.to_string()))?;

        let is_npy = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("npy"));

        let decoded = if is_npy {
            decode_npy(&bytes)
        } else {
            decode_json(&bytes)
        };

        let store = decoded
            .and_then(|(data, dimension)| Self::build(data, dimension))
            .map_err(|e| FriendRecError::store_load(path, format!("{e:#}")))?;

        info!(
            path = %path.display(),
            users = store.len(),
            dimension = store.dimension(),
            "Loaded embedding store"
        );
        Ok(store)
    }

    /// Build a store from one vector per user.
    ///
    /// # Errors
    ///
    /// Returns [`FriendRecError::StoreLoad`] under the same conditions as
    /// [`EmbeddingStore::load`].
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        flatten_rows(rows)
            .and_then(|(data, dimension)| Self::build(data, dimension))
            .map_err(|e| FriendRecError::store_load("<memory>", format!("{e:#}")))
    }

    /// Build a store from a row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`FriendRecError::StoreLoad`] if `data` is empty, `dimension`
    /// is zero or does not divide `data.len()`, or any value is non-finite.
    pub fn from_flat(data: Vec<f32>, dimension: usize) -> Result<Self> {
        Self::build(data, dimension)
            .map_err(|e| FriendRecError::store_load("<memory>", format!("{e:#}")))
    }

    fn build(data: Vec<f32>, dimension: usize) -> anyhow::Result<Self> {
        ensure!(!data.is_empty(), "embedding store is empty");
        ensure!(dimension > 0, "embedding dimension must be non-zero");
        ensure!(
            data.len() % dimension == 0,
            "{} values do not divide into rows of {dimension}",
            data.len()
        );
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            anyhow::bail!(
                "non-finite value at row {}, column {}",
                pos / dimension,
                pos % dimension
            );
        }

        let norms: Vec<f32> = data.chunks_exact(dimension).map(l2_norm).collect();
        debug!(users = norms.len(), dimension, "Computed row norms");

        Ok(Self {
            data,
            norms,
            dimension,
        })
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.norms.len()
    }

    /// Always `false` for a successfully built store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.norms.is_empty()
    }

    /// Embedding dimension.
    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// The vector at `index`.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.dimension)?;
        self.data.get(start..start.checked_add(self.dimension)?)
    }

    /// All vectors in row order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension)
    }

    /// L2 norm of the vector at `index`.
    #[must_use]
    pub fn norm(&self, index: usize) -> Option<f32> {
        self.norms.get(index).copied()
    }

    /// Cosine similarity between two rows.
    ///
    /// Returns `None` if either index is out of range.
    #[must_use]
    pub fn similarity(&self, a: usize, b: usize) -> Option<f32> {
        Some(cosine_with_norms(
            self.row(a)?,
            self.norms[a],
            self.row(b)?,
            self.norms[b],
        ))
    }

    /// Cosine similarity of row `index` against every row, itself included.
    ///
    /// The returned vector is indexed like the store. Zero-norm rows score 0.0.
    ///
    /// # Errors
    ///
    /// Returns [`FriendRecError::IndexOutOfRange`] if `index >= len()`.
    pub fn similarity_to_all(&self, index: usize) -> Result<Vec<f32>> {
        let query = self.row(index).ok_or(FriendRecError::IndexOutOfRange {
            index,
            len: self.len(),
        })?;
        let query_norm = self.norms[index];

        if self.len() >= PARALLEL_THRESHOLD {
            Ok(self.scores_parallel(query, query_norm))
        } else {
            Ok(self.scores_sequential(query, query_norm))
        }
    }

    fn scores_sequential(&self, query: &[f32], query_norm: f32) -> Vec<f32> {
        self.rows()
            .zip(&self.norms)
            .map(|(row, &norm)| cosine_with_norms(query, query_norm, row, norm))
            .collect()
    }

    fn scores_parallel(&self, query: &[f32], query_norm: f32) -> Vec<f32> {
        self.data
            .par_chunks_exact(self.dimension)
            .zip(self.norms.par_iter())
            .map(|(row, &norm)| cosine_with_norms(query, query_norm, row, norm))
            .collect()
    }

    /// Summary statistics for `stats` and `doctor`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> StoreStats {
        let zero_norm_rows = self.norms.iter().filter(|n| **n <= 0.0).count();
        let min_norm = self.norms.iter().copied().fold(f32::INFINITY, f32::min);
        let max_norm = self.norms.iter().copied().fold(0.0, f32::max);
        let mean_norm = self.norms.iter().sum::<f32>() / self.len() as f32;

        StoreStats {
            users: self.len(),
            dimension: self.dimension,
            zero_norm_rows,
            min_norm,
            mean_norm,
            max_norm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn build_npy_bytes(descr: &str, fortran: bool, shape: &str, payload: &[u8]) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '{descr}', 'fortran_order': {}, 'shape': {shape}, }}",
            if fortran { "True" } else { "False" }
        );
        // numpy pads the header so the payload starts on a 64-byte boundary
        while (NPY_V1_PREFIX_LEN + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&NPY_MAGIC);
        bytes.push(1);
        bytes.push(0);
        bytes.extend_from_slice(&u16::try_from(header.len()).unwrap().to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn f32_payload(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn write_temp(suffix: &str, bytes: &[u8]) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    fn three_user_store() -> EmbeddingStore {
        EmbeddingStore::from_rows(vec![vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap()
    }

    #[allow(clippy::cast_precision_loss)]
    fn pseudo_random_rows(n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|r| {
                (0..dim)
                    .map(|c| ((r * 31 + c * 17) % 97) as f32 / 97.0 - 0.5)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_npy_header_ok() {
        let bytes = build_npy_bytes("<f4", false, "(2, 3)", &f32_payload(&[0.0; 6]));
        let header = parse_npy_header(&bytes).unwrap();
        assert_eq!(header.dtype, NpyDtype::F32);
        assert_eq!((header.rows, header.cols), (2, 3));
        assert_eq!(header.data_start % 64, 0);
    }

    #[test]
    fn test_npy_invalid_magic() {
        let mut bytes = build_npy_bytes("<f4", false, "(1, 2)", &f32_payload(&[1.0, 2.0]));
        bytes[1] = b'Z';
        assert!(parse_npy_header(&bytes).is_err());
    }

    #[test]
    fn test_npy_rejects_fortran_order() {
        let bytes = build_npy_bytes("<f4", true, "(1, 2)", &f32_payload(&[1.0, 2.0]));
        assert!(decode_npy(&bytes).is_err());
    }

    #[test]
    fn test_npy_rejects_wrong_rank() {
        let bytes = build_npy_bytes("<f4", false, "(4,)", &f32_payload(&[1.0; 4]));
        let err = decode_npy(&bytes).unwrap_err();
        assert!(err.to_string().contains("2-D"));
    }

    #[test]
    fn test_npy_rejects_unsupported_dtype() {
        let bytes = build_npy_bytes("<i8", false, "(1, 1)", &[0u8; 8]);
        assert!(decode_npy(&bytes).is_err());
    }

    #[test]
    fn test_npy_rejects_truncated_payload() {
        let bytes = build_npy_bytes("<f4", false, "(2, 2)", &f32_payload(&[1.0, 2.0, 3.0]));
        let err = decode_npy(&bytes).unwrap_err();
        assert!(err.to_string().contains("needs 16"));
    }

    #[test]
    fn test_npy_f8_is_narrowed() {
        let payload: Vec<u8> = [0.5f64, -1.25].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = build_npy_bytes("<f8", false, "(1, 2)", &payload);
        let (data, dim) = decode_npy(&bytes).unwrap();
        assert_eq!(dim, 2);
        assert_eq!(data, vec![0.5, -1.25]);
    }

    #[test]
    fn test_load_npy_file() {
        let bytes = build_npy_bytes(
            "<f4",
            false,
            "(3, 2)",
            &f32_payload(&[1.0, 0.0, 1.0, 0.0, 0.0, 1.0]),
        );
        let file = write_temp(".npy", &bytes);
        let store = EmbeddingStore::load(file.path()).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.dimension(), 2);
        assert_eq!(store.row(2), Some(&[0.0, 1.0][..]));
    }

    #[test]
    fn test_load_json_file() {
        let file = write_temp(".json", b"[[1.0, 2.0, 3.0], [4, 5, 6]]");
        let store = EmbeddingStore::load(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.dimension(), 3);
    }

    #[test]
    fn test_load_missing_file_is_store_load_error() {
        let err = EmbeddingStore::load(Path::new("/nonexistent/user_embeddings.json")).unwrap_err();
        assert!(matches!(err, FriendRecError::StoreLoad { .. }));
    }

    #[test]
    fn test_load_rejects_ragged_rows() {
        let file = write_temp(".json", b"[[1.0, 2.0], [3.0]]");
        let err = EmbeddingStore::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("row 1 has dimension 1"));
    }

    #[test]
    fn test_load_rejects_non_numeric() {
        let file = write_temp(".json", br#"[[1.0, "a"]]"#);
        assert!(matches!(
            EmbeddingStore::load(file.path()),
            Err(FriendRecError::StoreLoad { .. })
        ));
    }

    #[test]
    fn test_rejects_empty_store() {
        let file = write_temp(".json", b"[]");
        assert!(EmbeddingStore::load(file.path()).is_err());
        assert!(EmbeddingStore::from_rows(vec![vec![]]).is_err());
        assert!(EmbeddingStore::from_flat(vec![], 4).is_err());
    }

    #[test]
    fn test_rejects_non_finite() {
        let err = EmbeddingStore::from_flat(vec![1.0, f32::NAN, 0.0, 1.0], 2).unwrap_err();
        assert!(err.to_string().contains("row 0, column 1"));
    }

    #[test]
    fn test_from_flat_rejects_partial_row() {
        assert!(EmbeddingStore::from_flat(vec![1.0, 2.0, 3.0], 2).is_err());
        assert!(EmbeddingStore::from_flat(vec![1.0, 2.0], 0).is_err());
    }

    #[test]
    fn test_similarity_to_all_includes_self() {
        let store = three_user_store();
        let scores = store.similarity_to_all(0).unwrap();
        assert_eq!(scores.len(), 3);
        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!((scores[1] - 1.0).abs() < 1e-6);
        assert!(scores[2].abs() < 1e-6);
    }

    #[test]
    fn test_similarity_to_all_out_of_range() {
        let store = three_user_store();
        let err = store.similarity_to_all(3).unwrap_err();
        assert!(matches!(
            err,
            FriendRecError::IndexOutOfRange { index: 3, len: 3 }
        ));
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let store = EmbeddingStore::from_rows(pseudo_random_rows(12, 32)).unwrap();
        for a in 0..store.len() {
            for b in 0..store.len() {
                assert_eq!(store.similarity(a, b), store.similarity(b, a));
            }
        }
    }

    #[test]
    fn test_self_similarity_is_one() {
        let store = EmbeddingStore::from_rows(pseudo_random_rows(20, 32)).unwrap();
        for i in 0..store.len() {
            let s = store.similarity(i, i).unwrap();
            assert!((s - 1.0).abs() < 1e-5, "row {i}: {s}");
        }
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let store =
            EmbeddingStore::from_rows(vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 2.0]])
                .unwrap();
        let scores = store.similarity_to_all(0).unwrap();
        assert!(scores.iter().all(|s| *s == 0.0));

        let scores = store.similarity_to_all(1).unwrap();
        assert_eq!(scores[0], 0.0);
        assert!(scores.iter().all(|s| !s.is_nan()));
    }

    #[test]
    fn test_tiny_vector_is_not_zero() {
        let store =
            EmbeddingStore::from_rows(vec![vec![1e-7, 0.0], vec![2.0, 0.0], vec![0.0, 1.0]])
                .unwrap();
        let scores = store.similarity_to_all(0).unwrap();
        assert!((scores[0] - 1.0).abs() < 1e-5);
        assert!((scores[1] - 1.0).abs() < 1e-5);
        assert!(scores[2].abs() < 1e-6);
        assert_eq!(store.stats().zero_norm_rows, 0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let store = EmbeddingStore::from_rows(pseudo_random_rows(257, 32)).unwrap();
        let query = store.row(5).unwrap();
        let norm = store.norm(5).unwrap();
        assert_eq!(
            store.scores_sequential(query, norm),
            store.scores_parallel(query, norm)
        );
    }

    #[test]
    fn test_stats() {
        let store =
            EmbeddingStore::from_rows(vec![vec![0.0, 0.0], vec![3.0, 4.0], vec![0.0, 1.0]])
                .unwrap();
        let stats = store.stats();
        assert_eq!(stats.users, 3);
        assert_eq!(stats.dimension, 2);
        assert_eq!(stats.zero_norm_rows, 1);
        assert!((stats.max_norm - 5.0).abs() < 1e-6);
        assert!(stats.min_norm.abs() < 1e-6);
        assert!((stats.mean_norm - 2.0).abs() < 1e-6);
    }
}
