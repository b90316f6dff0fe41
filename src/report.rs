//! Integrity report and partial-progress sidecars.
//!
//! Every recovered file gets a multi-digest record so the receiver can
//! cross-check against whatever hash the sender published out of band.
//! Files that end the stream incomplete leave a sidecar listing exactly
//! which chunks are missing, which makes a second capture pass targeted.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha1::Digest as _;

use crate::error::Result;
use crate::packet_format::FileMetadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveredFileRecord {
    pub file_name: String,
    pub file_path: String,
    pub size: u64,
    pub verified: bool,
    /// Checksum carried in the stream metadata, empty when never seen.
    pub stream_checksum: String,
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
    pub crc32: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub scan_date: String,
    pub directory: String,
    pub files: HashMap<String, RecoveredFileRecord>,
}

impl IntegrityReport {
    pub fn new(directory: &Path) -> Self {
        Self {
            scan_date: chrono::Utc::now().to_rfc3339(),
            directory: directory.to_string_lossy().to_string(),
            files: HashMap::new(),
        }
    }

    pub fn add_file(
        &mut self,
        file_id: &str,
        file_name: &str,
        file_path: &str,
        bytes: &[u8],
        stream_checksum: &str,
        verified: bool,
    ) {
        self.files.insert(
            file_id.to_string(),
            RecoveredFileRecord {
                file_name: file_name.to_string(),
                file_path: file_path.to_string(),
                size: bytes.len() as u64,
                verified,
                stream_checksum: stream_checksum.to_string(),
                md5: format!("{:x}", md5::compute(bytes)),
                sha1: {
                    let mut hasher = sha1::Sha1::new();
                    hasher.update(bytes);
                    format!("{:x}", hasher.finalize())
                },
                sha256: crate::chunking::sha256_hex(bytes),
                crc32: {
                    let mut hasher = crc32fast::Hasher::new();
                    hasher.update(bytes);
                    format!("{:x}", hasher.finalize())
                },
            },
        );
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("integrity_report.json");
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(path)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartialSidecar {
    pub file_id: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub recovered_chunks: u32,
    pub total_chunks: u32,
    pub percentage: u32,
    pub missing_chunks: Vec<u32>,
    pub last_updated: String,
}

/// Write `<file_id>.partial.json` describing an incomplete recovery.
pub fn write_partial_sidecar(
    dir: &Path,
    file_id: &str,
    metadata: Option<&FileMetadata>,
    recovered: u32,
    total: u32,
    missing: &[u32],
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let sidecar = PartialSidecar {
        file_id: file_id.to_string(),
        file_name: metadata.map(|m| m.file_name.clone()),
        file_size: metadata.map(|m| m.file_size),
        recovered_chunks: recovered,
        total_chunks: total,
        percentage: if total > 0 {
            (recovered as f64 / total as f64 * 100.0).round() as u32
        } else {
            0
        },
        missing_chunks: missing.to_vec(),
        last_updated: chrono::Utc::now().to_rfc3339(),
    };
    let path = dir.join(format!("{file_id}.partial.json"));
    std::fs::write(&path, serde_json::to_string_pretty(&sidecar)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_records_all_digests() {
        let mut report = IntegrityReport::new(Path::new("/tmp/out"));
        report.add_file("a1b2c3d4", "x.bin", "/tmp/out/x.bin", b"hello world", "", true);

        let record = &report.files["a1b2c3d4"];
        assert_eq!(record.size, 11);
        assert_eq!(record.md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(record.sha1, "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed");
        assert_eq!(
            record.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert!(record.verified);
    }

    #[test]
    fn sidecar_round_trips_through_json() {
        let dir = std::env::temp_dir().join(format!("qff_sidecar_test_{}", std::process::id()));
        let path = write_partial_sidecar(&dir, "deadbeef", None, 3, 8, &[0, 4, 5, 6, 7]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: PartialSidecar = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.file_id, "deadbeef");
        assert_eq!(parsed.recovered_chunks, 3);
        assert_eq!(parsed.percentage, 38);
        assert_eq!(parsed.missing_chunks.len(), 5);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
