//! Exact (brute-force) L2 index over a dense row-major matrix.
//!
//! Distances are squared Euclidean, the convention of flat L2 engines, so
//! thresholds tuned against those engines keep their meaning.

use crate::errors::RagError;

const MAGIC: &[u8; 8] = b"DQFLATL2";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 4 + 8;

/// Flat index; row `i` is the `i`-th vector added.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatL2Index {
    dim: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    /// Builds an index from vectors of identical, non-zero dimension.
    ///
    /// # Errors
    /// - [`RagError::EmptyCorpus`] if `vectors` is empty.
    /// - [`RagError::DimensionMismatch`] if any vector differs from the first.
    /// - [`RagError::Embedding`] if the vectors are zero-length.
    pub fn from_vectors(vectors: &[Vec<f32>]) -> Result<Self, RagError> {
        let dim = vectors.first().map(Vec::len).ok_or(RagError::EmptyCorpus)?;
        if dim == 0 {
            return Err(RagError::Embedding("embedder returned empty vectors".into()));
        }

        let mut data = Vec::with_capacity(dim * vectors.len());
        for v in vectors {
            if v.len() != dim {
                return Err(RagError::DimensionMismatch {
                    got: v.len(),
                    want: dim,
                });
            }
            data.extend_from_slice(v);
        }
        Ok(Self { dim, data })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, i: usize) -> Option<&[f32]> {
        self.data.get(i * self.dim..(i + 1) * self.dim)
    }

    /// Returns up to `k` `(row, distance)` pairs by ascending distance.
    /// Equal distances keep row order.
    ///
    /// # Errors
    /// - [`RagError::DimensionMismatch`] if `query` has the wrong length.
    /// - [`RagError::Embedding`] if a distance is not finite.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, RagError> {
        if query.len() != self.dim {
            return Err(RagError::DimensionMismatch {
                got: query.len(),
                want: self.dim,
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dim)
            .map(|row| squared_l2(query, row))
            .enumerate()
            .collect();

        if let Some((row, d)) = scored.iter().find(|(_, d)| !d.is_finite()) {
            return Err(RagError::Embedding(format!(
                "non-finite distance {d} at row {row}"
            )));
        }

        // Stable sort keeps row order for ties.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        Ok(scored)
    }

    /// Serializes to the on-disk format (little-endian).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.dim as u32).to_le_bytes());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for x in &self.data {
            out.extend_from_slice(&x.to_le_bytes());
        }
        out
    }

    /// Parses the on-disk format.
    ///
    /// # Errors
    /// [`RagError::CorruptIndex`] on bad magic, unknown version, zero dimension,
    /// or a body whose length disagrees with the header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RagError> {
        if bytes.len() < HEADER_LEN {
            return Err(RagError::CorruptIndex(format!(
                "index file too short: {} bytes",
                bytes.len()
            )));
        }
        let (header, body) = bytes.split_at(HEADER_LEN);
        if &header[..8] != MAGIC {
            return Err(RagError::CorruptIndex("bad index magic".into()));
        }
        let version = u32::from_le_bytes(le_array(&header[8..12]));
        if version != FORMAT_VERSION {
            return Err(RagError::CorruptIndex(format!(
                "unsupported index format version {version}"
            )));
        }
        let dim = u32::from_le_bytes(le_array(&header[12..16])) as usize;
        let count = u64::from_le_bytes(le_array(&header[16..24]));
        if dim == 0 {
            return Err(RagError::CorruptIndex("index dimension is zero".into()));
        }

        let expected = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(dim))
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| RagError::CorruptIndex(format!("row count {count} overflows")))?;
        if body.len() != expected {
            return Err(RagError::CorruptIndex(format!(
                "index body is {} bytes, header announces {count} x {dim} floats",
                body.len()
            )));
        }

        let data = body
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(le_array(c)))
            .collect();
        Ok(Self { dim, data })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
