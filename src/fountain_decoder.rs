//! Online peeling decoder.
//!
//! Packets arrive in any order, with duplicates and gaps. Each packet is
//! reduced against the chunks already recovered; a residual singleton
//! recovers a chunk immediately and back-propagates through the pending
//! list until no further substitution is possible. Completion is gated on
//! the SHA-256 carried in the file metadata: a full recovery that fails the
//! hash poisons the decoder instead of emitting bytes.

use std::collections::HashSet;
use std::collections::VecDeque;

use crate::chunking::{assemble, sha256_hex, xor_into};
use crate::error::Error;
use crate::packet_format::{CodedPacket, FileMetadata};
use crate::rng::select_chunk_indices;

/// Per-file lifecycle. Transitions are monotone; `Done` and `Poisoned` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DecodeState {
    Fresh,
    MetadataKnown,
    DataFlowing,
    Done,
    Poisoned,
}

/// A coded packet that still references more than one unknown chunk. Both
/// fields shrink as recovered chunks are substituted out.
struct PendingPacket {
    data: Vec<u8>,
    /// Sorted residual chunk indices.
    indices: Vec<u32>,
}

pub struct FountainDecoder {
    file_id: String,
    k: u32,
    /// Learned from the first packet payload; all packets must agree.
    chunk_size: Option<usize>,
    metadata: Option<FileMetadata>,
    recovered: Vec<Option<Vec<u8>>>,
    recovered_count: u32,
    pending: Vec<PendingPacket>,
    seen_ids: HashSet<u32>,
    state: DecodeState,
    /// Assembled output; padded tail still present if metadata never arrived.
    assembled: Option<Vec<u8>>,
    failure: Option<Error>,
}

impl FountainDecoder {
    /// Decoder primed by a metadata packet.
    pub fn from_metadata(metadata: FileMetadata) -> Self {
        let k = metadata.chunks_count;
        let file_id = metadata.file_id.clone();
        Self {
            file_id,
            k,
            chunk_size: None,
            metadata: Some(metadata),
            recovered: vec![None; k as usize],
            recovered_count: 0,
            pending: Vec::new(),
            seen_ids: HashSet::new(),
            state: DecodeState::MetadataKnown,
            assembled: None,
            failure: None,
        }
    }

    /// Decoder spawned by a data packet that arrived before any metadata.
    /// It can recover bytes but cannot truncate or verify until metadata is
    /// attached.
    pub fn provisional(file_id: &str, chunks_count: u32) -> Self {
        Self {
            file_id: file_id.to_string(),
            k: chunks_count,
            chunk_size: None,
            metadata: None,
            recovered: vec![None; chunks_count as usize],
            recovered_count: 0,
            pending: Vec::new(),
            seen_ids: HashSet::new(),
            state: DecodeState::Fresh,
            assembled: None,
            failure: None,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == DecodeState::Done
    }

    pub fn is_poisoned(&self) -> bool {
        self.state == DecodeState::Poisoned
    }

    pub fn metadata(&self) -> Option<&FileMetadata> {
        self.metadata.as_ref()
    }

    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// `(recovered, K)`.
    pub fn recovery_progress(&self) -> (u32, u32) {
        (self.recovered_count, self.k)
    }

    /// Chunk indices still missing, ascending.
    pub fn missing_indices(&self) -> Vec<u32> {
        self.recovered
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| i as u32)
            .collect()
    }

    pub fn pending_packets(&self) -> usize {
        self.pending.len()
    }

    /// Attach metadata to a provisional decoder. Redundant metadata is a
    /// no-op; a chunk-count disagreement poisons the decoder.
    pub fn attach_metadata(&mut self, metadata: FileMetadata) -> Result<(), Error> {
        if self.metadata.is_some() || self.is_done() || self.is_poisoned() {
            return Ok(());
        }
        if metadata.chunks_count != self.k {
            let err = Error::ChunkCountMismatch {
                expected: self.k,
                got: metadata.chunks_count,
            };
            self.state = DecodeState::Poisoned;
            self.failure = Some(Error::ChunkCountMismatch {
                expected: self.k,
                got: metadata.chunks_count,
            });
            return Err(err);
        }
        self.metadata = Some(metadata);
        self.advance(DecodeState::MetadataKnown);
        self.try_complete();
        Ok(())
    }

    /// Feed one coded packet. Returns `true` when the packet was consumed
    /// (even if it carried no new information); `false` for duplicates,
    /// terminal decoders and packets inconsistent with this file's
    /// parameters. The return value only drives progress display.
    pub fn add_packet(&mut self, pkt: &CodedPacket) -> bool {
        if self.is_done() || self.is_poisoned() {
            return false;
        }
        if pkt.chunks_count != self.k || pkt.degree as u32 > self.k {
            return false;
        }
        match self.chunk_size {
            Some(size) if pkt.data.len() != size => return false,
            None => self.chunk_size = Some(pkt.data.len()),
            _ => {}
        }
        if !self.seen_ids.insert(pkt.id) {
            return false;
        }

        self.advance(DecodeState::DataFlowing);

        // The index list is never transmitted; regenerate it from the seed.
        let indices = select_chunk_indices(pkt.seed, pkt.degree, self.k);

        let mut residual = pkt.data.clone();
        let mut residual_indices = Vec::with_capacity(indices.len());
        for &i in &indices {
            match &self.recovered[i as usize] {
                Some(chunk) => xor_into(&mut residual, chunk),
                None => residual_indices.push(i),
            }
        }

        match residual_indices.len() {
            0 => {} // fully redundant
            1 => {
                let target = residual_indices[0];
                self.store_chunk(target, residual);
                self.back_propagate(target);
            }
            _ => self.pending.push(PendingPacket {
                data: residual,
                indices: residual_indices,
            }),
        }

        if self.recovered_count == self.k {
            self.try_complete();
        }
        true
    }

    /// The recovered file, available once the checksum verified.
    /// Idempotent; `None` until then.
    pub fn finalize_file(&self) -> Option<&[u8]> {
        if self.is_done() {
            self.assembled.as_deref()
        } else {
            None
        }
    }

    /// Recovered bytes of a decoder that reached K chunks without metadata.
    /// The zero-padded tail is still present and no checksum was checked.
    pub fn unverified_bytes(&self) -> Option<&[u8]> {
        if !self.is_done() && self.recovered_count == self.k {
            self.assembled.as_deref()
        } else {
            None
        }
    }

    fn store_chunk(&mut self, index: u32, data: Vec<u8>) {
        let slot = &mut self.recovered[index as usize];
        // Monotone: a recovered chunk is never replaced.
        if slot.is_none() {
            *slot = Some(data);
            self.recovered_count += 1;
        }
    }

    /// Substitute a newly recovered chunk through the pending list, promoting
    /// every entry that collapses to a singleton, until a fixed point.
    fn back_propagate(&mut self, first: u32) {
        let mut queue = VecDeque::from([first]);
        while let Some(j) = queue.pop_front() {
            let Some(chunk) = self.recovered[j as usize].clone() else {
                continue;
            };
            let mut i = 0;
            while i < self.pending.len() {
                let Ok(pos) = self.pending[i].indices.binary_search(&j) else {
                    i += 1;
                    continue;
                };
                xor_into(&mut self.pending[i].data, &chunk);
                self.pending[i].indices.remove(pos);
                match self.pending[i].indices.len() {
                    0 => {
                        self.pending.remove(i);
                    }
                    1 => {
                        let entry = self.pending.remove(i);
                        let target = entry.indices[0];
                        if self.recovered[target as usize].is_none() {
                            self.store_chunk(target, entry.data);
                            queue.push_back(target);
                        }
                    }
                    _ => i += 1,
                }
            }
        }
    }

    /// Assemble once all K chunks are in, then verify against the metadata
    /// checksum. Without metadata the padded buffer is kept for an
    /// unverified surface at end-of-stream.
    fn try_complete(&mut self) {
        if self.recovered_count < self.k || self.is_done() || self.is_poisoned() {
            return;
        }

        let chunk_size = self.chunk_size.unwrap_or(0);
        let mut chunks = Vec::with_capacity(self.k as usize);
        for chunk in &self.recovered {
            match chunk {
                Some(chunk) => chunks.push(chunk.as_slice()),
                None => return,
            }
        }

        let Some(meta) = &self.metadata else {
            self.assembled = Some(assemble(&chunks, self.k as usize * chunk_size));
            return;
        };

        let buf = assemble(&chunks, meta.file_size as usize);
        let actual = sha256_hex(&buf);
        if actual == meta.file_checksum {
            self.assembled = Some(buf);
            self.pending.clear();
            self.state = DecodeState::Done;
        } else {
            self.assembled = None;
            self.failure = Some(Error::ChecksumMismatch {
                expected: meta.file_checksum.clone(),
                actual,
            });
            self.state = DecodeState::Poisoned;
        }
    }

    fn advance(&mut self, target: DecodeState) {
        if self.state < target && self.state < DecodeState::Done {
            self.state = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::split_chunks;
    use crate::fountain_encoder::{describe_file, FountainEncoder};
    use crate::rng::PacketRng;

    fn test_bytes(len: usize, seed: u32) -> Vec<u8> {
        let mut rng = PacketRng::new(seed);
        (0..len).map(|_| rng.next_u32() as u8).collect()
    }

    fn encode(data: &[u8], chunk_size: usize, redundancy: f64) -> (FileMetadata, FountainEncoder) {
        let meta = describe_file(
            "test.bin",
            "application/octet-stream",
            data,
            chunk_size,
            (redundancy * crate::chunking::chunks_count(data.len(), chunk_size) as f64).ceil()
                as u32,
        );
        let enc = FountainEncoder::new(data, &meta.file_id, chunk_size, true).unwrap();
        (meta, enc)
    }

    #[test]
    fn tiny_file_exact_reverse_order() {
        // 4 bytes, chunk_size 2: K = 2 systematic packets, fed in reverse.
        let data = [0xDE, 0xAD, 0xBE, 0xEF];
        let (meta, enc) = encode(&data, 2, 1.0);
        assert_eq!(meta.chunks_count, 2);

        let p0 = enc.packet(0);
        let p1 = enc.packet(1);
        assert_eq!((p0.degree, p0.data.as_slice()), (1, &[0xDE, 0xAD][..]));
        assert_eq!((p1.degree, p1.data.as_slice()), (1, &[0xBE, 0xEF][..]));

        let mut dec = FountainDecoder::from_metadata(meta);
        assert!(dec.add_packet(&p1));
        assert!(!dec.is_done());
        assert!(dec.add_packet(&p0));
        assert!(dec.is_done());
        assert_eq!(dec.finalize_file().unwrap(), &data);
    }

    #[test]
    fn systematic_packets_alone_suffice() {
        let data = test_bytes(4096, 21);
        let (meta, enc) = encode(&data, 256, 1.5);
        let k = enc.chunks_count();

        let mut dec = FountainDecoder::from_metadata(meta);
        for n in 0..k {
            assert!(dec.add_packet(&enc.packet(n)));
        }
        assert!(dec.is_done());
        assert_eq!(dec.finalize_file().unwrap(), data.as_slice());
    }

    #[test]
    fn degree_three_packet_peels_after_two_singletons() {
        // K = 3: feed A^B^C first, then A, then B; C falls out of the pending
        // packet by back-propagation.
        let data = test_bytes(96, 2);
        let (meta, _) = encode(&data, 32, 1.0);
        let chunks = split_chunks(&data, 32);
        let file_id = meta.file_id.clone();

        let mut combined = vec![0u8; 32];
        for chunk in &chunks {
            xor_into(&mut combined, chunk);
        }
        // select(seed, 3, 3) is always {0, 1, 2}.
        let xor_all = CodedPacket {
            file_id: file_id.clone(),
            id: 10,
            seed: 7,
            seed_base: 7,
            chunks_count: 3,
            degree: 3,
            data: combined,
        };
        let single = |id: u32, idx: u32| CodedPacket {
            file_id: file_id.clone(),
            id,
            seed: idx,
            seed_base: idx,
            chunks_count: 3,
            degree: 1,
            data: chunks[idx as usize].clone(),
        };

        let mut dec = FountainDecoder::from_metadata(meta);
        assert!(dec.add_packet(&xor_all));
        assert_eq!(dec.pending_packets(), 1);
        assert_eq!(dec.recovery_progress(), (0, 3));

        assert!(dec.add_packet(&single(11, 0)));
        assert_eq!(dec.recovery_progress(), (1, 3));
        assert_eq!(dec.pending_packets(), 1);

        assert!(dec.add_packet(&single(12, 1)));
        assert!(dec.is_done(), "third chunk should peel out of the pending packet");
        assert_eq!(dec.finalize_file().unwrap(), data.as_slice());
    }

    #[test]
    fn duplicate_ids_are_rejected_and_harmless() {
        let data = test_bytes(1024, 4);
        let (meta, enc) = encode(&data, 128, 2.0);
        let mut dec = FountainDecoder::from_metadata(meta);

        let pkt = enc.packet(0);
        assert!(dec.add_packet(&pkt));
        assert!(!dec.add_packet(&pkt), "same id must be dropped");
        assert_eq!(dec.recovery_progress().0, 1);

        for n in 1..enc.chunks_count() {
            let pkt = enc.packet(n);
            assert!(dec.add_packet(&pkt));
            assert!(!dec.add_packet(&pkt) || dec.is_done());
        }
        assert!(dec.is_done());
        assert_eq!(dec.finalize_file().unwrap(), data.as_slice());
    }

    #[test]
    fn recovered_chunks_are_monotone() {
        let data = test_bytes(512, 8);
        let (meta, enc) = encode(&data, 64, 2.0);
        let k = enc.chunks_count();
        let mut dec = FountainDecoder::from_metadata(meta);

        for n in 0..k {
            dec.add_packet(&enc.packet(n));
        }
        assert!(dec.is_done());
        let before = dec.finalize_file().unwrap().to_vec();

        // Stragglers after done: ignored, output unchanged.
        for n in k..(2 * k) {
            assert!(!dec.add_packet(&enc.packet(n)));
        }
        assert_eq!(dec.finalize_file().unwrap(), before.as_slice());
    }

    #[test]
    fn survives_packet_loss() {
        // Rateless: dropping every 5th packet only stretches the stream.
        let data = test_bytes(64 * 1024, 64);
        let (meta, enc) = encode(&data, 1024, 1.5);
        let k = enc.chunks_count();
        assert_eq!(k, 64);

        let mut dec = FountainDecoder::from_metadata(meta);
        let mut fed = 0u32;
        let mut n = 0u32;
        while !dec.is_done() {
            assert!(n < 10 * k, "decoder did not converge within 10x overhead");
            let pkt = enc.packet(n);
            n += 1;
            if n % 5 == 0 {
                continue; // dropped frame
            }
            dec.add_packet(&pkt);
            fed += 1;
        }
        assert!(dec.is_done());
        assert!(fed >= k, "cannot decode from fewer than K packets");
        assert_eq!(dec.finalize_file().unwrap(), data.as_slice());
    }

    #[test]
    fn final_buffer_is_order_independent() {
        let data = test_bytes(8 * 1024, 33);
        let (meta, enc) = encode(&data, 512, 2.0);
        let packets: Vec<CodedPacket> = enc.packets(2.0).collect();

        let mut forward = FountainDecoder::from_metadata(meta.clone());
        for pkt in &packets {
            forward.add_packet(pkt);
        }
        let mut reverse = FountainDecoder::from_metadata(meta);
        for pkt in packets.iter().rev() {
            reverse.add_packet(pkt);
        }

        assert!(forward.is_done());
        assert!(reverse.is_done());
        assert_eq!(forward.finalize_file().unwrap(), reverse.finalize_file().unwrap());
    }

    #[test]
    fn corrupted_packet_poisons_instead_of_completing() {
        let data = test_bytes(2048, 13);
        let (meta, enc) = encode(&data, 256, 1.0);
        let k = enc.chunks_count();
        let mut dec = FountainDecoder::from_metadata(meta);

        for n in 0..k {
            let mut pkt = enc.packet(n);
            if pkt.id == 3 {
                pkt.data[0] ^= 0x01; // single bit flip
            }
            dec.add_packet(&pkt);
        }

        assert_eq!(dec.recovery_progress(), (k, k));
        assert!(dec.is_poisoned());
        assert!(dec.finalize_file().is_none());
        assert!(matches!(dec.failure(), Some(Error::ChecksumMismatch { .. })));

        // Terminal: further packets change nothing.
        assert!(!dec.add_packet(&enc.packet(k)));
        assert!(dec.is_poisoned());
    }

    #[test]
    fn provisional_decoder_recovers_then_verifies_on_late_metadata() {
        let data = test_bytes(3000, 17);
        let (meta, enc) = encode(&data, 512, 1.5);
        let k = enc.chunks_count();

        let mut dec = FountainDecoder::provisional(&meta.file_id, k);
        assert_eq!(dec.state(), DecodeState::Fresh);
        for n in 0..k {
            dec.add_packet(&enc.packet(n));
        }
        assert_eq!(dec.state(), DecodeState::DataFlowing);
        assert!(!dec.is_done(), "no checksum yet, cannot claim done");
        let padded = dec.unverified_bytes().unwrap().to_vec();
        assert_eq!(padded.len(), k as usize * 512);

        dec.attach_metadata(meta).unwrap();
        assert!(dec.is_done());
        assert_eq!(dec.finalize_file().unwrap(), data.as_slice());
    }

    #[test]
    fn chunk_count_mismatch_poisons_provisional_decoder() {
        let data = test_bytes(3000, 18);
        let (mut meta, enc) = encode(&data, 512, 1.5);
        let mut dec = FountainDecoder::provisional(&meta.file_id, enc.chunks_count());
        dec.add_packet(&enc.packet(0));

        meta.chunks_count += 1;
        assert!(matches!(
            dec.attach_metadata(meta),
            Err(Error::ChunkCountMismatch { .. })
        ));
        assert!(dec.is_poisoned());
    }

    #[test]
    fn redundant_metadata_is_ignored() {
        let data = test_bytes(600, 19);
        let (meta, enc) = encode(&data, 128, 1.0);
        let mut dec = FountainDecoder::from_metadata(meta.clone());

        let mut bogus = meta.clone();
        bogus.file_name = "other.bin".to_string();
        dec.attach_metadata(bogus).unwrap();
        assert_eq!(dec.metadata().unwrap().file_name, meta.file_name);

        for pkt in enc.packets(1.0) {
            dec.add_packet(&pkt);
        }
        assert!(dec.is_done());
    }

    #[test]
    fn repeated_singleton_matches_the_recovered_chunk() {
        let data = test_bytes(640, 29);
        let (meta, enc) = encode(&data, 128, 2.0);
        let mut dec = FountainDecoder::from_metadata(meta);

        let first = enc.packet(0);
        assert!(dec.add_packet(&first));

        // A fresh id carrying the same degree-1 selection must agree byte
        // for byte with what was already recovered.
        let mut again = enc.packet(0);
        again.id = 900;
        assert_eq!(again.data, first.data);
        assert!(dec.add_packet(&again), "redundant but well-formed packets are consumed");
        assert_eq!(dec.recovery_progress().0, 1);
    }

    #[test]
    fn mismatched_packet_parameters_are_dropped() {
        let data = test_bytes(1024, 23);
        let (meta, enc) = encode(&data, 128, 1.0);
        let mut dec = FountainDecoder::from_metadata(meta);

        let mut alien = enc.packet(0);
        alien.chunks_count += 4;
        assert!(!dec.add_packet(&alien));

        let good = enc.packet(0);
        assert!(dec.add_packet(&good));

        let mut short = enc.packet(1);
        short.data.truncate(17);
        assert!(!dec.add_packet(&short));
        assert_eq!(dec.recovery_progress().0, 1);
    }
}
