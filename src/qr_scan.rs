//! QR symbol reading from frame images.
//!
//! rqrr does the bulk of the work; quircs gets a second look at frames rqrr
//! could not lock onto, which recovers a useful fraction of motion-blurred
//! frames.

use image::{ImageBuffer, Luma};

use crate::error::{Error, Result};

type LumaImage = ImageBuffer<Luma<u8>, Vec<u8>>;

/// Decode every QR symbol found in a grayscale frame.
pub fn scan_luma(luma: &LumaImage) -> Vec<String> {
    let codes = scan_rqrr(luma.clone());
    if !codes.is_empty() {
        return codes;
    }
    scan_quircs(luma)
}

/// Load an image file and scan it.
pub fn scan_image_file(path: &std::path::Path) -> Result<Vec<String>> {
    let img = image::open(path).map_err(|e| Error::Video(format!("{}: {e}", path.display())))?;
    Ok(scan_luma(&img.to_luma8()))
}

fn scan_rqrr(luma: LumaImage) -> Vec<String> {
    let mut codes = Vec::new();
    let mut scanner = rqrr::PreparedImage::prepare(luma);
    for grid in scanner.detect_grids() {
        if let Ok((_, content)) = grid.decode() {
            codes.push(content);
        }
    }
    codes
}

fn scan_quircs(luma: &LumaImage) -> Vec<String> {
    let mut codes = Vec::new();
    let mut decoder = quircs::Quirc::new();
    let found = decoder.identify(luma.width() as usize, luma.height() as usize, luma);
    for code in found {
        let Ok(valid) = code else { continue };
        if let Ok(decoded) = valid.decode() {
            if let Ok(content) = String::from_utf8(decoded.payload) {
                codes.push(content);
            }
        }
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Density, ErrorCorrection};
    use crate::qr_render::render_qr_frame;

    #[test]
    fn scans_back_a_rendered_symbol() {
        let line = "D:a1b2c3d4:0:0:0:4:1:AAAAAAAA";
        let frame = render_qr_frame(line, Density::Low.qr_version(), ErrorCorrection::L, 4)
            .expect("render");
        let codes = scan_luma(&frame);
        assert_eq!(codes, vec![line.to_string()]);
    }

    #[test]
    fn blank_frame_scans_to_nothing() {
        let blank: LumaImage = ImageBuffer::from_pixel(64, 64, Luma([255u8]));
        assert!(scan_luma(&blank).is_empty());
    }
}
