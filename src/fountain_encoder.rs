//! Rateless packet generation.
//!
//! The encoder is pure: packet `n` is fully determined by the source chunks
//! and `n`, so the stream can be regenerated, extended or sampled at any
//! point. In systematic mode the first K packets are the source chunks
//! themselves; every later packet XORs a pseudo-random selection of chunks
//! whose degree is drawn from the Robust Soliton distribution.

use crate::chunking::{chunks_count, sha256_hex, split_chunks, xor_into};
use crate::error::{Error, Result};
use crate::packet_format::{CodedPacket, FileMetadata};
use crate::rng::select_chunk_indices;
use crate::soliton::DegreeDistribution;

pub struct FountainEncoder {
    chunks: Vec<Vec<u8>>,
    chunk_size: usize,
    file_id: String,
    /// Offset added to packet ids so several files can share one stream.
    id_base: u32,
    systematic: bool,
    degrees: DegreeDistribution,
}

impl FountainEncoder {
    pub fn new(data: &[u8], file_id: &str, chunk_size: usize, systematic: bool) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        if chunk_size == 0 {
            return Err(Error::InvalidChunkSize);
        }
        let chunks = split_chunks(data, chunk_size);
        let k = chunks.len() as u32;
        Ok(Self {
            chunks,
            chunk_size,
            file_id: file_id.to_string(),
            id_base: 0,
            systematic,
            degrees: DegreeDistribution::new(k),
        })
    }

    /// Continue packet ids from an earlier file in the same session.
    pub fn with_id_base(mut self, id_base: u32) -> Self {
        self.id_base = id_base;
        self
    }

    pub fn chunks_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Packets emitted for the given redundancy factor: `ceil(rho * K)`.
    pub fn packet_count(&self, redundancy: f64) -> u32 {
        (redundancy * self.chunks_count() as f64).ceil() as u32
    }

    /// Generate packet `n` of this file's stream. Deterministic.
    pub fn packet(&self, n: u32) -> CodedPacket {
        let k = self.chunks_count();
        let (degree, data) = if self.systematic && n < k {
            (1u16, self.chunks[n as usize].clone())
        } else {
            let degree = self.degrees.sample(n);
            let indices = select_chunk_indices(n, degree, k);
            let mut data = vec![0u8; self.chunk_size];
            for &i in &indices {
                xor_into(&mut data, &self.chunks[i as usize]);
            }
            (degree, data)
        };

        CodedPacket {
            file_id: self.file_id.clone(),
            id: self.id_base + n,
            seed: n,
            seed_base: n,
            chunks_count: k,
            degree,
            data,
        }
    }

    /// Lazy packet stream of `packet_count(redundancy)` packets.
    pub fn packets(&self, redundancy: f64) -> impl Iterator<Item = CodedPacket> + '_ {
        (0..self.packet_count(redundancy)).map(|n| self.packet(n))
    }
}

/// Build the metadata record paired with an encoder over the same bytes.
pub fn describe_file(
    file_name: &str,
    file_type: &str,
    data: &[u8],
    chunk_size: usize,
    packet_count: u32,
) -> FileMetadata {
    FileMetadata::describe(
        file_name,
        file_type,
        sha256_hex(data),
        data.len() as u64,
        chunks_count(data.len(), chunk_size),
        packet_count,
    )
}
