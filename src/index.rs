//! Flat exact-search vector index under squared Euclidean distance.
//!
//! On-disk layout (all little-endian):
//!
//! ```text
//! magic "CVIX" | version u32 | dimension u32 | rows u64 | rows * dimension f32
//! ```

use rayon::prelude::*;
use std::cmp::Ordering;
use std::mem::size_of;
use std::path::Path;

use crate::config::Number;
use crate::error::{RagError, Result};
use crate::vector_ops::squared_euclidean_simd;

const MAGIC: &[u8; 4] = b"CVIX";
const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row: usize,
    pub distance: Number,
}

fn closest_first(a: &SearchHit, b: &SearchHit) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.row.cmp(&b.row))
}

/// Append-only, row-major store of fixed-dimension vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<Number>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn with_capacity(dimension: usize, rows: usize) -> Self {
        Self {
            dimension,
            data: Vec::with_capacity(dimension * rows),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, vector: &[Number]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    pub fn vector(&self, row: usize) -> Option<&[Number]> {
        let start = row.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Returns the `k` closest rows, nearest first, ties broken by row id.
    /// A `k` larger than the index returns every row.
    pub fn search(&self, query: &[Number], k: usize) -> Result<Vec<SearchHit>> {
        // A zero-row index built from an empty corpus has no dimension to check against.
        if self.dimension == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .par_chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, vector)| SearchHit {
                row,
                distance: squared_euclidean_simd(query, vector).unwrap_or(Number::INFINITY),
            })
            .collect();

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, closest_first);
            hits.truncate(k);
        }
        hits.sort_unstable_by(closest_first);
        Ok(hits)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.data.len() * size_of::<Number>());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend(self.data.iter().flat_map(|&num| num.to_le_bytes()));
        bytes
    }

    /// Decodes an index file image. `path` is only used for error reporting.
    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(RagError::corrupt(
                path,
                format!("file is {} bytes, shorter than the header", bytes.len()),
            ));
        }
        if &bytes[..4] != MAGIC {
            return Err(RagError::corrupt(path, "not an index file (bad magic)"));
        }

        let version = read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(RagError::corrupt(
                path,
                format!("unsupported format version {}", version),
            ));
        }

        let dimension = read_u32(&bytes[8..12]) as usize;
        let rows = read_u64(&bytes[12..20]) as usize;
        let body = &bytes[HEADER_SIZE..];
        let expected_len = rows
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(size_of::<Number>()));

        if expected_len != Some(body.len()) {
            return Err(RagError::corrupt(
                path,
                format!(
                    "header declares {} rows of {}D but body holds {} bytes",
                    rows,
                    dimension,
                    body.len()
                ),
            ));
        }

        let data = body
            .chunks_exact(size_of::<Number>())
            .map(|b| Number::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { dimension, data })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn index_from(rows: &[Vec<Number>]) -> FlatIndex {
        let mut index = FlatIndex::new(rows[0].len());
        for row in rows {
            index.add(row).unwrap();
        }
        index
    }

    fn random_index(rows: usize, dimension: usize) -> FlatIndex {
        let mut rng = rand::thread_rng();
        let mut index = FlatIndex::with_capacity(dimension, rows);
        for _ in 0..rows {
            let v: Vec<Number> = (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();
            index.add(&v).unwrap();
        }
        index
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = index_from(&[vec![5.0, 0.0], vec![1.0, 0.0], vec![3.0, 0.0]]);
        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let rows: Vec<usize> = hits.iter().map(|h| h.row).collect();
        assert_eq!(rows, vec![1, 2, 0]);
        assert_eq!(hits[0].distance, 1.0);
        assert_eq!(hits[1].distance, 9.0);
        assert_eq!(hits[2].distance, 25.0);
    }

    #[test]
    fn test_search_breaks_ties_by_row() {
        let index = index_from(&[
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![-1.0, 0.0],
            vec![0.0, -1.0],
        ]);
        let hits = index.search(&[0.0, 0.0], 4).unwrap();
        let rows: Vec<usize> = hits.iter().map(|h| h.row).collect();
        assert_eq!(rows, vec![0, 1, 2, 3]);

        let top2 = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(top2.iter().map(|h| h.row).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_search_matches_brute_force() {
        let mut rng = rand::thread_rng();
        let index = random_index(300, 24);
        for _ in 0..20 {
            let query: Vec<Number> = (0..24).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let k = rng.gen_range(1..40);
            let hits = index.search(&query, k).unwrap();

            assert_eq!(hits.len(), k);
            assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

            let min = (0..index.len())
                .map(|row| squared_euclidean_simd(&query, index.vector(row).unwrap()).unwrap())
                .fold(Number::INFINITY, Number::min);
            assert_eq!(hits[0].distance, min);
        }
    }

    #[test]
    fn test_search_k_larger_than_rows_returns_all() {
        let index = random_index(7, 8);
        let hits = index.search(&[0.0; 8], 100).unwrap();
        assert_eq!(hits.len(), 7);
        let mut rows: Vec<usize> = hits.iter().map(|h| h.row).collect();
        rows.sort_unstable();
        assert_eq!(rows, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_search_zero_k_and_empty_index() {
        let index = random_index(3, 4);
        assert!(index.search(&[0.0; 4], 0).unwrap().is_empty());
        assert!(FlatIndex::new(4).search(&[0.0; 4], 3).unwrap().is_empty());
        assert!(FlatIndex::new(0).search(&[0.0; 7], 3).unwrap().is_empty());
    }

    #[test]
    fn test_search_empty_index_still_checks_dimension() {
        let err = FlatIndex::new(384).search(&vec![0.0; 256], 3).unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 384,
                actual: 256
            }
        ));
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let index = random_index(4, 384);
        let err = index.search(&vec![0.1; 256], 5).unwrap_err();
        match err {
            RagError::DimensionMismatch { expected, actual } => {
                assert_eq!(expected, 384);
                assert_eq!(actual, 256);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_add_rejects_wrong_dimension() {
        let mut index = FlatIndex::new(3);
        assert!(index.add(&[1.0, 2.0]).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let index = random_index(5, 12);
        let decoded = FlatIndex::from_bytes(&index.to_bytes(), Path::new("mem")).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn test_from_bytes_rejects_damage() {
        let bytes = random_index(3, 8).to_bytes();
        let path = Path::new("mem");

        assert!(FlatIndex::from_bytes(&bytes[..10], path).is_err());
        assert!(FlatIndex::from_bytes(&bytes[..bytes.len() - 4], path).is_err());

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            FlatIndex::from_bytes(&bad_magic, path),
            Err(RagError::CorruptIndex { .. })
        ));
    }
}
