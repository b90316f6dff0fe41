//! QR frame rendering for the encoder pipeline.
//!
//! Every packet line renders at one fixed QR version so all frames share the
//! same pixel geometry, which the video muxer requires. The metadata line is
//! repeated at the head of the stream and re-injected periodically so a
//! receiver that joins late still learns the file parameters.

use image::{ImageBuffer, Luma};
use qrcode::{QrCode, Version};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::config::{qr_byte_capacity, EncoderConfig, ErrorCorrection};
use crate::error::{Error, Result};

/// Copies of the metadata frame at the head of the stream.
pub const METADATA_HEAD_REPEATS: usize = 10;
/// A metadata frame is re-injected after this many data frames.
pub const METADATA_REINJECT_INTERVAL: usize = 200;

/// Quiet zone width in modules.
const QUIET_MODULES: u32 = 4;

type LumaImage = ImageBuffer<Luma<u8>, Vec<u8>>;

/// Lay out the full frame sequence for one file: repeated metadata head,
/// then data frames with periodic metadata re-injection.
pub fn frame_plan(metadata_line: &str, packet_lines: &[String]) -> Vec<String> {
    let mut plan = Vec::with_capacity(
        METADATA_HEAD_REPEATS + packet_lines.len() + packet_lines.len() / METADATA_REINJECT_INTERVAL,
    );
    for _ in 0..METADATA_HEAD_REPEATS {
        plan.push(metadata_line.to_string());
    }
    for (i, line) in packet_lines.iter().enumerate() {
        if i > 0 && i % METADATA_REINJECT_INTERVAL == 0 {
            plan.push(metadata_line.to_string());
        }
        plan.push(line.clone());
    }
    plan
}

/// Check a packet line against the symbol capacity of the configuration.
/// Returns `true` when the line fits but crowds past 80% of capacity.
pub fn check_capacity(line_len: usize, config: &EncoderConfig) -> Result<bool> {
    let version = config.qr_version();
    let capacity = qr_byte_capacity(version, config.error_correction)
        .ok_or_else(|| Error::QrEncode(format!("unsupported QR version {version}")))?;
    if line_len > capacity {
        return Err(Error::PacketExceedsCapacity {
            len: line_len,
            capacity,
            version,
            ec: config.error_correction.letter(),
        });
    }
    Ok(line_len * 10 > capacity * 8)
}

/// Render one packet line to a grayscale frame at the given QR version.
pub fn render_qr_frame(
    line: &str,
    version: i16,
    ec: ErrorCorrection,
    module_px: u32,
) -> Result<LumaImage> {
    let code = QrCode::with_version(line.as_bytes(), Version::Normal(version), ec.ec_level())
        .map_err(|e| Error::QrEncode(e.to_string()))?;

    let width = code.width() as u32;
    let colors = code.to_colors();
    let dim = (width + 2 * QUIET_MODULES) * module_px;
    let mut img: LumaImage = ImageBuffer::from_pixel(dim, dim, Luma([255u8]));

    for (i, color) in colors.iter().enumerate() {
        if *color != qrcode::Color::Dark {
            continue;
        }
        let mx = (i as u32 % width + QUIET_MODULES) * module_px;
        let my = (i as u32 / width + QUIET_MODULES) * module_px;
        for dy in 0..module_px {
            for dx in 0..module_px {
                img.put_pixel(mx + dx, my + dy, Luma([0u8]));
            }
        }
    }
    Ok(img)
}

/// Render a frame plan to numbered PNGs, in parallel. `on_frame` is invoked
/// once per finished frame (progress reporting).
pub fn render_frames_to_dir<F>(
    plan: &[String],
    config: &EncoderConfig,
    dir: &Path,
    on_frame: F,
) -> Result<Vec<PathBuf>>
where
    F: Fn() + Send + Sync,
{
    std::fs::create_dir_all(dir)?;
    let version = config.qr_version();
    let ec = config.error_correction;

    let paths: Vec<PathBuf> = (0..plan.len())
        .map(|i| dir.join(format!("frame_{:06}.png", i)))
        .collect();

    plan.par_iter()
        .zip(paths.par_iter())
        .try_for_each(|(line, path)| -> Result<()> {
            let frame = render_qr_frame(line, version, ec, 4)?;
            frame
                .save(path)
                .map_err(|e| Error::Video(format!("saving {}: {e}", path.display())))?;
            on_frame();
            Ok(())
        })?;

    Ok(paths)
}
