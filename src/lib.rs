//! qr-fountain-files: file transport over QR-code video.
//!
//! A file is chunked, expanded into a rateless fountain stream of coded
//! packets, and each packet is rendered as one QR frame of a video. The
//! receiving side samples frames from the video, reads the QR symbols and
//! feeds the packet lines to per-file peeling decoders; any sufficiently
//! large subset of frames recovers the original bytes, verified against the
//! SHA-256 carried in the stream metadata.
//!
//! The codec core (`chunking`, `rng`, `soliton`, `packet_format`,
//! `fountain_encoder`, `fountain_decoder`, `dispatch`) is synchronous and
//! does no I/O; video, QR raster work and the filesystem live at the edges
//! (`video`, `qr_scan`, `qr_render`, `frame_source`, `report`).
//!
//! # Example
//!
//! ```
//! use qr_fountain_files::fountain_encoder::{describe_file, FountainEncoder};
//! use qr_fountain_files::fountain_decoder::FountainDecoder;
//!
//! let data = b"fountain-coded transfer".to_vec();
//! let meta = describe_file("hello.txt", "text/plain", &data, 8, 5);
//! let encoder = FountainEncoder::new(&data, &meta.file_id, 8, true).unwrap();
//!
//! let mut decoder = FountainDecoder::from_metadata(meta);
//! let mut n = 0;
//! while !decoder.is_done() {
//!     decoder.add_packet(&encoder.packet(n));
//!     n += 1;
//! }
//! assert_eq!(decoder.finalize_file().unwrap(), data.as_slice());
//! ```

pub mod chunking;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod error_logger;
pub mod events;
pub mod fountain_decoder;
pub mod fountain_encoder;
pub mod frame_source;
pub mod packet_format;
pub mod qr_render;
pub mod qr_scan;
pub mod report;
pub mod rng;
pub mod soliton;
pub mod video;

pub use config::{DecoderConfig, Density, EncoderConfig, ErrorCorrection};
pub use dispatch::{DirectorySink, FileOutcome, FrameDriver, OutputSink, StreamSummary};
pub use error::{Error, Result};
pub use fountain_decoder::{DecodeState, FountainDecoder};
pub use fountain_encoder::{describe_file, FountainEncoder};
pub use packet_format::{parse_line, CodedPacket, FileMetadata, Packet};
