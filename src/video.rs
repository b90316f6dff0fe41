//! Video plumbing: probing, frame extraction and muxing.
//!
//! The stream geometry comes from ffmpeg-next; the heavy lifting of frame
//! extraction and muxing is delegated to the external `ffmpeg` binary, which
//! sidesteps long-lived decoder contexts and keeps memory flat. Extracted
//! frames are deleted as soon as they have been scanned.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use ffmpeg_next as ffmpeg;

use crate::error::{Error, Result};
use crate::frame_source::{FrameEvent, FrameSource};
use crate::qr_scan::scan_image_file;

/// Frames skipped per fast-scan request.
const FAST_SCAN_STRIDE: usize = 120;

#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
    pub total_frames: u64,
    pub file_size: u64,
}

/// Probe stream geometry, frame rate and duration.
pub fn probe_video(input_path: &Path) -> Result<VideoInfo> {
    ffmpeg::init().map_err(|e| Error::Video(format!("failed to initialize FFmpeg: {e}")))?;
    ffmpeg::log::set_level(ffmpeg::log::Level::Quiet);

    let ictx = ffmpeg::format::input(&input_path)
        .map_err(|e| Error::Video(format!("failed to open video file: {e}")))?;

    let video_stream = ictx
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| Error::Video("no video stream found".to_string()))?;

    let time_base = video_stream.time_base();
    let duration_seconds = video_stream.duration() as f64 * f64::from(time_base);

    let fps = video_stream.avg_frame_rate();
    let fps_value = if fps.denominator() > 0 {
        fps.numerator() as f64 / fps.denominator() as f64
    } else {
        0.0
    };

    let codec_params = video_stream.parameters();
    let (width, height) = match ffmpeg::codec::context::Context::from_parameters(codec_params)
        .and_then(|ctx| ctx.decoder().video())
    {
        Ok(decoder) => (decoder.width(), decoder.height()),
        Err(_) => (0, 0),
    };

    let file_size = fs::metadata(input_path).map(|m| m.len()).unwrap_or(0);

    Ok(VideoInfo {
        width,
        height,
        fps: fps_value,
        duration: duration_seconds,
        total_frames: (duration_seconds * fps_value) as u64,
        file_size,
    })
}

/// Sampled frame source backed by a video file.
///
/// Frames are extracted up front at the requested sampling rate; each frame
/// file is scanned on demand and removed immediately afterwards. When a
/// frame carries several symbols the extras queue behind the first.
pub struct VideoFrameSource {
    frames: Vec<PathBuf>,
    next: usize,
    frame_interval: f64,
    queued: Vec<(f64, String)>,
    work_dir: PathBuf,
}

impl VideoFrameSource {
    pub fn open(video: &Path, frame_rate: f64, work_dir: &Path) -> Result<Self> {
        fs::create_dir_all(work_dir)?;
        extract_frames(video, frame_rate, work_dir)?;

        let mut frames: Vec<PathBuf> = fs::read_dir(work_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("png"))
            .collect();
        frames.sort();

        Ok(Self {
            frames,
            next: 0,
            frame_interval: 1.0 / frame_rate.max(f64::MIN_POSITIVE),
            queued: Vec::new(),
            work_dir: work_dir.to_path_buf(),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for VideoFrameSource {
    fn next_frame(&mut self) -> Result<Option<FrameEvent>> {
        if let Some((timestamp, line)) = self.queued.pop() {
            return Ok(Some(FrameEvent {
                timestamp,
                decoded: Some(line),
            }));
        }
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        let timestamp = self.next as f64 * self.frame_interval;
        self.next += 1;

        let mut codes = scan_image_file(path).unwrap_or_default();
        let _ = fs::remove_file(path);

        let first = if codes.is_empty() {
            None
        } else {
            let first = codes.remove(0);
            // Preserve order for the remainder.
            while let Some(extra) = codes.pop() {
                self.queued.push((timestamp, extra));
            }
            Some(first)
        };

        Ok(Some(FrameEvent {
            timestamp,
            decoded: first,
        }))
    }

    fn skip_ahead(&mut self) {
        self.next = (self.next + FAST_SCAN_STRIDE).min(self.frames.len());
    }
}

impl Drop for VideoFrameSource {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.work_dir);
    }
}

/// Extract frames at `frame_rate` fps into `dir` as numbered PNGs.
fn extract_frames(video: &Path, frame_rate: f64, dir: &Path) -> Result<()> {
    let output = Command::new("ffmpeg")
        .args([
            "-i",
            &video.to_string_lossy(),
            "-vf",
            &format!("fps={frame_rate}"),
            "-y",
            "-loglevel",
            "quiet",
            &format!("{}/frame_%06d.png", dir.to_string_lossy()),
        ])
        .output()
        .map_err(|e| Error::Video(format!("failed to execute ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Video(format!("ffmpeg frame extraction failed: {stderr}")));
    }
    Ok(())
}

/// Mux numbered PNG frames into a video.
pub fn mux_frames_to_video(frames_dir: &Path, fps: u32, output: &Path) -> Result<()> {
    let pattern = frames_dir.join("frame_%06d.png");
    let result = Command::new("ffmpeg")
        .args([
            "-framerate",
            &fps.to_string(),
            "-i",
            &pattern.to_string_lossy(),
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-y",
            "-loglevel",
            "error",
            &output.to_string_lossy(),
        ])
        .output()
        .map_err(|e| Error::Video(format!("failed to execute ffmpeg: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(Error::Video(format!("ffmpeg mux failed: {stderr}")));
    }
    Ok(())
}
