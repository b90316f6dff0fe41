//! Frame sources: where decoded QR strings come from.
//!
//! The dispatch driver pulls `(timestamp, decoded string or nothing)` events
//! one at a time. Besides the live video source in `video`, a JSONL source
//! replays the scan stream a previous extraction pass dumped, which makes
//! re-decoding cheap and gives tests a deterministic feed.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One sampled frame. `decoded` is `None` when no QR symbol was readable.
#[derive(Debug, Clone)]
pub struct FrameEvent {
    pub timestamp: f64,
    pub decoded: Option<String>,
}

pub trait FrameSource {
    /// Next frame event, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<FrameEvent>>;

    /// Hint from the driver that the remaining nearby frames are unlikely to
    /// carry new information. Sources that cannot seek ignore it.
    fn skip_ahead(&mut self) {}
}

// ==================== JSONL scan stream ====================

/// Line format of a dumped scan stream.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScanRecord {
    #[serde(rename = "header")]
    Header { video_info: ScanVideoInfo },
    #[serde(rename = "qr_code")]
    QrCode {
        frame_number: u64,
        timestamp_ms: f64,
        data: String,
    },
    #[serde(rename = "footer")]
    Footer { summary: ScanSummary },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanVideoInfo {
    pub duration_seconds: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanSummary {
    pub frames_processed: u64,
    pub qr_codes_found: u64,
    pub processing_time_ms: u64,
}

/// Replays a JSONL scan stream as frame events.
pub struct JsonlFrameSource<R: BufRead> {
    reader: R,
    pub skipped_lines: u64,
    pub video_info: Option<ScanVideoInfo>,
    done: bool,
}

impl JsonlFrameSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonlFrameSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            skipped_lines: 0,
            video_info: None,
            done: false,
        }
    }
}

impl<R: BufRead> FrameSource for JsonlFrameSource<R> {
    fn next_frame(&mut self) -> Result<Option<FrameEvent>> {
        if self.done {
            return Ok(None);
        }
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                self.done = true;
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ScanRecord>(trimmed) {
                Ok(ScanRecord::Header { video_info }) => {
                    self.video_info = Some(video_info);
                }
                Ok(ScanRecord::QrCode {
                    timestamp_ms, data, ..
                }) => {
                    return Ok(Some(FrameEvent {
                        timestamp: timestamp_ms / 1000.0,
                        decoded: Some(data),
                    }));
                }
                Ok(ScanRecord::Footer { .. }) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(_) => {
                    self.skipped_lines += 1;
                }
            }
        }
    }
}

// ==================== In-memory source ====================

/// Feeds a fixed sequence of decoded strings; `None` entries model frames
/// where the reader saw nothing.
pub struct VecFrameSource {
    frames: VecDeque<Option<String>>,
    frame_interval: f64,
    next_index: u64,
    pub skips_requested: u64,
}

impl VecFrameSource {
    pub fn new(frames: Vec<Option<String>>, frame_rate: f64) -> Self {
        Self {
            frames: frames.into(),
            frame_interval: 1.0 / frame_rate.max(f64::MIN_POSITIVE),
            next_index: 0,
            skips_requested: 0,
        }
    }

    /// Source where every frame decoded successfully.
    pub fn from_lines(lines: Vec<String>) -> Self {
        Self::new(lines.into_iter().map(Some).collect(), 1.0)
    }
}

impl FrameSource for VecFrameSource {
    fn next_frame(&mut self) -> Result<Option<FrameEvent>> {
        match self.frames.pop_front() {
            Some(decoded) => {
                let timestamp = self.next_index as f64 * self.frame_interval;
                self.next_index += 1;
                Ok(Some(FrameEvent { timestamp, decoded }))
            }
            None => Ok(None),
        }
    }

    fn skip_ahead(&mut self) {
        self.skips_requested += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn jsonl_source_replays_qr_records() {
        let stream = concat!(
            "{\"type\":\"header\",\"video_info\":{\"duration_seconds\":60.0,\"fps\":10.0,\"width\":640,\"height\":640}}\n",
            "\n",
            "{\"type\":\"qr_code\",\"frame_number\":1,\"timestamp_ms\":100.0,\"data\":\"first\"}\n",
            "not json at all\n",
            "{\"type\":\"qr_code\",\"frame_number\":2,\"timestamp_ms\":200.0,\"data\":\"second\"}\n",
            "{\"type\":\"footer\",\"summary\":{\"frames_processed\":600,\"qr_codes_found\":2,\"processing_time_ms\":1500}}\n",
        );
        let mut source = JsonlFrameSource::new(Cursor::new(stream));

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.decoded.as_deref(), Some("first"));
        assert!((first.timestamp - 0.1).abs() < 1e-9);

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.decoded.as_deref(), Some("second"));

        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.skipped_lines, 1);
        assert!(source.video_info.is_some());
    }

    #[test]
    fn vec_source_spaces_timestamps_by_frame_rate() {
        let mut source = VecFrameSource::new(
            vec![Some("a".to_string()), None, Some("b".to_string())],
            2.0,
        );
        let a = source.next_frame().unwrap().unwrap();
        let blank = source.next_frame().unwrap().unwrap();
        let b = source.next_frame().unwrap().unwrap();
        assert_eq!(a.decoded.as_deref(), Some("a"));
        assert!(blank.decoded.is_none());
        assert!((b.timestamp - 1.0).abs() < 1e-9);
        assert!(source.next_frame().unwrap().is_none());
    }
}
