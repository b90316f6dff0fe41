//! Error types shared across the codec core and the pipeline stages.
//!
//! The codec itself never performs I/O; the `Io`, `Video` and `Json` variants
//! exist for the frame sources, sinks and report writers built on top of it.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // ==================== Wire grammar ====================
    /// Line does not start with a known packet tag.
    #[error("unrecognized packet tag")]
    UnknownPacketTag,

    /// Line has fewer fields than the grammar requires.
    #[error("packet line truncated: expected at least {expected} fields, got {got}")]
    MissingFields { expected: usize, got: usize },

    /// A numeric field is not plain decimal ASCII.
    #[error("invalid numeric field `{field}`: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// File checksum field is not 64 hex characters.
    #[error("file checksum must be 64 hex chars, got {got}")]
    InvalidChecksum { got: usize },

    /// File id field is not 8 hex characters.
    #[error("file id must be 8 hex chars, got {0:?}")]
    InvalidFileId(String),

    /// Degree is zero or exceeds the packet's chunk count.
    #[error("degree {degree} outside valid range 1..={chunks_count}")]
    InvalidDegree { degree: u16, chunks_count: u32 },

    /// Payload field failed transport decoding.
    #[error("payload is not valid base64: {0}")]
    InvalidPayload(String),

    /// A URL-escaped text field failed to decode.
    #[error("invalid percent-encoded text field")]
    InvalidEscapedText,

    // ==================== Codec ====================
    /// The encoder was handed an empty buffer; there is no zero-chunk stream.
    #[error("input file is empty")]
    EmptyInput,

    /// Provisional decoder state and metadata disagree on the chunk count.
    #[error("chunk count mismatch: decoder expects {expected}, metadata carries {got}")]
    ChunkCountMismatch { expected: u32, got: u32 },

    /// Full recovery produced bytes whose hash does not match the metadata.
    #[error("checksum mismatch after full recovery: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The decoder was poisoned by an earlier inconsistency.
    #[error("decoder for file {file_id} is poisoned")]
    DecoderPoisoned { file_id: String },

    // ==================== Configuration ====================
    /// Redundancy below 1.0 cannot cover the source chunks.
    #[error("redundancy must be >= 1.0, got {0}")]
    InvalidRedundancy(f64),

    /// Chunk size of zero is meaningless.
    #[error("chunk size must be > 0")]
    InvalidChunkSize,

    /// A rendered packet line does not fit the configured QR symbol.
    #[error("packet of {len} bytes exceeds QR capacity {capacity} at version {version}/{ec}")]
    PacketExceedsCapacity {
        len: usize,
        capacity: usize,
        version: i16,
        ec: char,
    },

    // ==================== Pipeline ====================
    #[error("QR encode failed: {0}")]
    QrEncode(String),

    #[error("video processing failed: {0}")]
    Video(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
