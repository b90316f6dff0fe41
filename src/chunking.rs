//! Chunk splitting, reassembly and file identity.

use sha2::{Digest, Sha256};

/// Default source chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Length of the hex file id carried on the wire.
pub const FILE_ID_LEN: usize = 8;

/// Split a buffer into fixed-size chunks; the last chunk is zero-padded.
///
/// Chunk index equals `offset / chunk_size`; indices never renumber.
pub fn split_chunks(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    assert!(chunk_size > 0, "chunk_size must be > 0");
    let count = data.len().div_ceil(chunk_size);
    let mut chunks = Vec::with_capacity(count);
    for i in 0..count {
        let start = i * chunk_size;
        let end = ((i + 1) * chunk_size).min(data.len());
        let mut chunk = data[start..end].to_vec();
        chunk.resize(chunk_size, 0);
        chunks.push(chunk);
    }
    chunks
}

/// Number of chunks a buffer of `len` bytes splits into.
pub fn chunks_count(len: usize, chunk_size: usize) -> u32 {
    len.div_ceil(chunk_size) as u32
}

/// Concatenate recovered chunks in index order and drop the padding tail.
pub fn assemble<C: AsRef<[u8]>>(chunks: &[C], file_size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(
        chunks
            .len()
            .saturating_mul(chunks.first().map_or(0, |c| c.as_ref().len())),
    );
    for chunk in chunks {
        data.extend_from_slice(chunk.as_ref());
    }
    data.truncate(file_size);
    data
}

/// XOR `src` into `dst` in place. Slices must have equal length.
pub fn xor_into(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= s;
    }
}

/// Lowercase hex SHA-256 of a buffer.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// File id: the first 8 hex chars of the file checksum.
pub fn file_id_from_checksum(checksum: &str) -> String {
    checksum.chars().take(FILE_ID_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_with_zero_padded_tail() {
        let data = b"abcdefgh_";
        let chunks = split_chunks(data, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], b"abcd");
        assert_eq!(chunks[1], b"efgh");
        assert_eq!(chunks[2], b"_\0\0\0");
    }

    #[test]
    fn exact_multiple_has_no_padding() {
        let chunks = split_chunks(b"abcdefgh", 4);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 4));
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(split_chunks(&[], 16).is_empty());
        assert_eq!(chunks_count(0, 16), 0);
    }

    #[test]
    fn assemble_round_trips_with_truncation() {
        let data: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
        let chunks = split_chunks(&data, 64);
        assert_eq!(chunks_count(data.len(), 64) as usize, chunks.len());
        assert_eq!(assemble(&chunks, data.len()), data);
    }

    #[test]
    fn xor_is_an_involution() {
        let a: Vec<u8> = (0..32).collect();
        let b: Vec<u8> = (100..132).collect();
        let mut acc = a.clone();
        xor_into(&mut acc, &b);
        assert_ne!(acc, a);
        xor_into(&mut acc, &b);
        assert_eq!(acc, a);
    }

    #[test]
    fn checksum_and_file_id_shape() {
        let sum = sha256_hex(b"hello");
        assert_eq!(sum.len(), 64);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!sum.chars().any(|c| c.is_ascii_uppercase()));
        let id = file_id_from_checksum(&sum);
        assert_eq!(id.len(), FILE_ID_LEN);
        assert!(sum.starts_with(&id));
    }
}
