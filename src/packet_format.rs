//! Wire grammar: the single-line packet records carried inside QR symbols.
//!
//! Two record kinds share one grammar: metadata lines (`M:`) announce a file,
//! data lines (`D:`) carry one coded packet. Fields are colon-separated;
//! text fields are URL-escaped and the payload is Base64 (URL-safe alphabet,
//! unpadded), so field content never collides with the separator. Trailing
//! fields beyond the known grammar are reserved and ignored on read.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::chunking::{file_id_from_checksum, FILE_ID_LEN};
use crate::error::{Error, Result};

/// Wire format version emitted in metadata lines.
pub const WIRE_VERSION: &str = "4.0";

/// Identifier of this encoder, carried in metadata for diagnostics only.
pub const ENCODER_VERSION: &str = concat!("qff-", env!("CARGO_PKG_VERSION"));

const META_FIELDS: usize = 16;
const DATA_FIELDS: usize = 8;
const CHECKSUM_LEN: usize = 64;

/// Immutable description of one transported file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub version: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub chunks_count: u32,
    pub packet_count: u32,
    pub file_checksum: String,
    pub file_id: String,
    pub encoder_version: String,
}

impl FileMetadata {
    /// Build the metadata record for a file about to be encoded.
    pub fn describe(
        file_name: &str,
        file_type: &str,
        file_checksum: String,
        file_size: u64,
        chunks_count: u32,
        packet_count: u32,
    ) -> Self {
        let file_id = file_id_from_checksum(&file_checksum);
        Self {
            version: WIRE_VERSION.to_string(),
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            file_size,
            chunks_count,
            packet_count,
            file_checksum,
            file_id,
            encoder_version: ENCODER_VERSION.to_string(),
        }
    }

    pub fn to_wire_line(&self) -> String {
        format!(
            "M:{}:{}:{}:{}:{}:{}:0:0:0:0:0:0:{}:{}:{}",
            self.version,
            urlencoding::encode(&self.file_name),
            urlencoding::encode(&self.file_type),
            self.file_size,
            self.chunks_count,
            self.packet_count,
            self.file_id,
            self.file_checksum,
            self.encoder_version,
        )
    }

    fn from_fields(parts: &[&str]) -> Result<Self> {
        if parts.len() < META_FIELDS {
            return Err(Error::MissingFields {
                expected: META_FIELDS,
                got: parts.len(),
            });
        }

        let file_name = urlencoding::decode(parts[2])
            .map_err(|_| Error::InvalidEscapedText)?
            .into_owned();
        let file_type = urlencoding::decode(parts[3])
            .map_err(|_| Error::InvalidEscapedText)?
            .into_owned();
        let file_size = parse_decimal("file_size", parts[4])?;
        let chunks_count = parse_decimal("chunks_count", parts[5])? as u32;
        if chunks_count == 0 {
            return Err(Error::InvalidNumber {
                field: "chunks_count",
                value: parts[5].to_string(),
            });
        }
        let packet_count = parse_decimal("packet_count", parts[6])? as u32;
        // Fields 7..=12 are reserved; any values are accepted.
        let file_id = validate_file_id(parts[13])?;
        let file_checksum = validate_checksum(parts[14])?;

        Ok(Self {
            version: parts[1].to_string(),
            file_name,
            file_type,
            file_size,
            chunks_count,
            packet_count,
            file_checksum,
            file_id,
            encoder_version: parts[15].to_string(),
        })
    }
}

/// One coded packet: the XOR of `degree` source chunks, labeled with the seed
/// that regenerates the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedPacket {
    pub file_id: String,
    pub id: u32,
    pub seed: u32,
    pub seed_base: u32,
    pub chunks_count: u32,
    pub degree: u16,
    pub data: Vec<u8>,
}

impl CodedPacket {
    pub fn to_wire_line(&self) -> String {
        format!(
            "D:{}:{}:{}:{}:{}:{}:{}",
            self.file_id,
            self.id,
            self.seed,
            self.seed_base,
            self.chunks_count,
            self.degree,
            URL_SAFE_NO_PAD.encode(&self.data),
        )
    }

    fn from_fields(parts: &[&str]) -> Result<Self> {
        if parts.len() < DATA_FIELDS {
            return Err(Error::MissingFields {
                expected: DATA_FIELDS,
                got: parts.len(),
            });
        }

        let file_id = validate_file_id(parts[1])?;
        let id = parse_decimal("id", parts[2])? as u32;
        let seed = parse_decimal("seed", parts[3])? as u32;
        let seed_base = parse_decimal("seed_base", parts[4])? as u32;
        let chunks_count = parse_decimal("chunks_count", parts[5])? as u32;
        let degree_raw = parse_decimal("degree", parts[6])?;
        let degree = u16::try_from(degree_raw).map_err(|_| Error::InvalidNumber {
            field: "degree",
            value: parts[6].to_string(),
        })?;
        if degree == 0 || degree as u32 > chunks_count {
            return Err(Error::InvalidDegree {
                degree,
                chunks_count,
            });
        }
        let data = URL_SAFE_NO_PAD
            .decode(parts[7])
            .map_err(|e| Error::InvalidPayload(e.to_string()))?;

        Ok(Self {
            file_id,
            id,
            seed,
            seed_base,
            chunks_count,
            degree,
            data,
        })
    }
}

/// A parsed wire line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Metadata(FileMetadata),
    Data(CodedPacket),
}

/// Classify and parse one decoded QR string.
pub fn parse_line(line: &str) -> Result<Packet> {
    let parts: Vec<&str> = line.trim().split(':').collect();
    match parts.first() {
        Some(&"M") => FileMetadata::from_fields(&parts).map(Packet::Metadata),
        Some(&"D") => CodedPacket::from_fields(&parts).map(Packet::Data),
        _ => Err(Error::UnknownPacketTag),
    }
}

/// Strict decimal parse: plain ASCII digits only, no signs, no whitespace.
fn parse_decimal(field: &'static str, value: &str) -> Result<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidNumber {
            field,
            value: value.to_string(),
        });
    }
    value.parse().map_err(|_| Error::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn validate_checksum(value: &str) -> Result<String> {
    if value.len() != CHECKSUM_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidChecksum { got: value.len() });
    }
    Ok(value.to_ascii_lowercase())
}

fn validate_file_id(value: &str) -> Result<String> {
    if value.len() != FILE_ID_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidFileId(value.to_string()));
    }
    Ok(value.to_ascii_lowercase())
}
