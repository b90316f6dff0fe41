//! Encoder and decoder configuration.
//!
//! The QR capacity table drives the payload-size warning: a packet line that
//! exceeds 80% of the symbol capacity is fragile to camera blur, and one that
//! exceeds 100% cannot render at all.

use clap::ValueEnum;

use crate::error::{Error, Result};

/// QR symbol density presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Density {
    Low,
    Medium,
    High,
    Ultra,
}

impl Density {
    /// QR version (symbol size) this preset renders at.
    pub fn qr_version(self) -> i16 {
        match self {
            Density::Low => 21,
            Density::Medium => 25,
            Density::High => 29,
            Density::Ultra => 33,
        }
    }
}

/// QR error correction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ErrorCorrection {
    L,
    M,
    Q,
    H,
}

impl ErrorCorrection {
    pub fn ec_level(self) -> qrcode::EcLevel {
        match self {
            ErrorCorrection::L => qrcode::EcLevel::L,
            ErrorCorrection::M => qrcode::EcLevel::M,
            ErrorCorrection::Q => qrcode::EcLevel::Q,
            ErrorCorrection::H => qrcode::EcLevel::H,
        }
    }

    pub fn letter(self) -> char {
        match self {
            ErrorCorrection::L => 'L',
            ErrorCorrection::M => 'M',
            ErrorCorrection::Q => 'Q',
            ErrorCorrection::H => 'H',
        }
    }

    fn column(self) -> usize {
        match self {
            ErrorCorrection::L => 0,
            ErrorCorrection::M => 1,
            ErrorCorrection::Q => 2,
            ErrorCorrection::H => 3,
        }
    }
}

/// Byte-mode data capacity for the supported QR versions, per ECC level.
const CAPACITY_TABLE: [(i16, [usize; 4]); 4] = [
    (21, [929, 715, 523, 403]),
    (25, [1273, 997, 715, 535]),
    (29, [1732, 1370, 982, 742]),
    (33, [2303, 1809, 1286, 985]),
];

/// Byte capacity of one QR symbol at `version`/`ec`, or `None` for versions
/// outside the supported density presets.
pub fn qr_byte_capacity(version: i16, ec: ErrorCorrection) -> Option<usize> {
    CAPACITY_TABLE
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, row)| row[ec.column()])
}

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Video frame rate.
    pub fps: u32,
    /// Bytes per source chunk.
    pub chunk_size: usize,
    /// Packet count multiplier over the chunk count.
    pub redundancy: f64,
    pub density: Density,
    pub error_correction: ErrorCorrection,
    /// Emit the first K packets as plain degree-1 chunks.
    pub systematic: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            chunk_size: crate::chunking::DEFAULT_CHUNK_SIZE,
            redundancy: 1.5,
            density: Density::Medium,
            error_correction: ErrorCorrection::L,
            systematic: true,
        }
    }
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidChunkSize);
        }
        if !(self.redundancy >= 1.0) {
            return Err(Error::InvalidRedundancy(self.redundancy));
        }
        Ok(())
    }

    pub fn qr_version(&self) -> i16 {
        self.density.qr_version()
    }

    /// Capacity of the configured symbol.
    pub fn symbol_capacity(&self) -> usize {
        qr_byte_capacity(self.qr_version(), self.error_correction).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Frames per second to demand from the frame source.
    pub frame_rate: f64,
    /// Allow the driver to seek forward once all known files are terminal.
    pub fast_scan: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            frame_rate: 1.0,
            fast_scan: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_maps_to_versions() {
        assert_eq!(Density::Low.qr_version(), 21);
        assert_eq!(Density::Medium.qr_version(), 25);
        assert_eq!(Density::High.qr_version(), 29);
        assert_eq!(Density::Ultra.qr_version(), 33);
    }

    #[test]
    fn capacity_shrinks_with_stronger_correction() {
        for density in [Density::Low, Density::Medium, Density::High, Density::Ultra] {
            let v = density.qr_version();
            let l = qr_byte_capacity(v, ErrorCorrection::L).unwrap();
            let h = qr_byte_capacity(v, ErrorCorrection::H).unwrap();
            assert!(l > h);
        }
        assert_eq!(qr_byte_capacity(40, ErrorCorrection::L), None);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(EncoderConfig::default().validate().is_ok());
    }

    #[test]
    fn bad_redundancy_is_rejected() {
        let cfg = EncoderConfig {
            redundancy: 0.8,
            ..EncoderConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidRedundancy(_))));

        let cfg = EncoderConfig {
            redundancy: f64::NAN,
            ..EncoderConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
