//! Frame-driven dispatch: the state machine that turns a stream of decoded
//! QR strings into recovered files.
//!
//! One driver owns a registry of per-file decoders keyed by file id. Metadata
//! creates or completes a decoder; data packets route by the id they carry,
//! spawning a provisional decoder when metadata has not been seen yet.
//! Completed files are handed to the sink immediately so long multi-file
//! videos deliver results as they go; everything still open at end-of-stream
//! is reported as partial or unverified.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::DecoderConfig;
use crate::error::Result;
use crate::error_logger::SessionLogger;
use crate::events::{EventCallback, TransferEvent};
use crate::fountain_decoder::FountainDecoder;
use crate::frame_source::FrameSource;
use crate::packet_format::{parse_line, Packet};

/// Counters for everything the driver dropped or routed.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    pub frames_scanned: u64,
    pub decoded_strings: u64,
    pub malformed_lines: u64,
    pub metadata_sightings: u64,
    pub data_packets: u64,
    pub ignored_packets: u64,
}

/// Terminal description of one file at end-of-stream.
#[derive(Debug)]
pub enum FileOutcome {
    /// All chunks recovered and the checksum verified.
    Complete {
        metadata: crate::packet_format::FileMetadata,
        bytes: Vec<u8>,
    },
    /// All chunks recovered but metadata never arrived; the padded tail is
    /// still present and nothing was verified.
    Unverified { chunks_count: u32, bytes: Vec<u8> },
    Partial {
        recovered: u32,
        total: u32,
        missing: Vec<u32>,
    },
    Poisoned { reason: String },
}

#[derive(Debug)]
pub struct FileReport {
    pub file_id: String,
    pub metadata: Option<crate::packet_format::FileMetadata>,
    pub output_path: Option<PathBuf>,
    pub outcome: FileOutcome,
}

#[derive(Debug)]
pub struct StreamSummary {
    pub files: Vec<FileReport>,
    pub telemetry: Telemetry,
    pub cancelled: bool,
}

impl StreamSummary {
    /// `(complete, unverified, partial, poisoned)`.
    pub fn counts(&self) -> (usize, usize, usize, usize) {
        let mut counts = (0, 0, 0, 0);
        for report in &self.files {
            match report.outcome {
                FileOutcome::Complete { .. } => counts.0 += 1,
                FileOutcome::Unverified { .. } => counts.1 += 1,
                FileOutcome::Partial { .. } => counts.2 += 1,
                FileOutcome::Poisoned { .. } => counts.3 += 1,
            }
        }
        counts
    }

    /// 0 when every discovered file completed verified, 2 otherwise.
    pub fn exit_code(&self) -> i32 {
        let all_complete = self
            .files
            .iter()
            .all(|r| matches!(r.outcome, FileOutcome::Complete { .. }));
        if all_complete {
            0
        } else {
            2
        }
    }
}

/// Where finished files go.
pub trait OutputSink {
    fn deliver(
        &mut self,
        file_id: &str,
        metadata: &crate::packet_format::FileMetadata,
        bytes: &[u8],
    ) -> Result<PathBuf>;
}

/// Writes each finished file into a directory under its transported name.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }
}

impl OutputSink for DirectorySink {
    fn deliver(
        &mut self,
        file_id: &str,
        metadata: &crate::packet_format::FileMetadata,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let name = safe_file_name(&metadata.file_name, file_id);
        let path = self.dir.join(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Strip any path components a hostile file name might carry.
fn safe_file_name(name: &str, fallback: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(OsStr::to_str)
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{fallback}.bin"))
}

pub struct FrameDriver {
    config: DecoderConfig,
    registry: HashMap<String, FountainDecoder>,
    /// First-seen order, for stable reporting.
    order: Vec<String>,
    delivered: HashMap<String, PathBuf>,
    telemetry: Telemetry,
    cancel: Option<Arc<AtomicBool>>,
    events: Option<EventCallback>,
    logger: Option<Arc<SessionLogger>>,
}

impl FrameDriver {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            registry: HashMap::new(),
            order: Vec::new(),
            delivered: HashMap::new(),
            telemetry: Telemetry::default(),
            cancel: None,
            events: None,
            logger: None,
        }
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_events(mut self, events: EventCallback) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_logger(mut self, logger: Arc<SessionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn files_discovered(&self) -> usize {
        self.registry.len()
    }

    /// Drain the frame source, routing every decoded string, and report.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn OutputSink,
    ) -> Result<StreamSummary> {
        let mut cancelled = false;
        while let Some(event) = source.next_frame()? {
            if let Some(flag) = &self.cancel {
                if flag.load(Ordering::SeqCst) {
                    cancelled = true;
                    break;
                }
            }
            self.telemetry.frames_scanned += 1;
            if let Some(line) = event.decoded {
                self.telemetry.decoded_strings += 1;
                self.process_line(&line, event.timestamp, sink)?;
            }
            if self.config.fast_scan && self.all_files_terminal() {
                source.skip_ahead();
            }
        }

        if cancelled {
            // In-flight decoders are discarded without finalization.
            let keep: Vec<String> = self
                .registry
                .iter()
                .filter(|(_, d)| d.is_done() || d.is_poisoned())
                .map(|(id, _)| id.clone())
                .collect();
            self.registry.retain(|id, _| keep.contains(id));
            self.order.retain(|id| keep.contains(id));
        }

        Ok(self.finish(cancelled))
    }

    fn all_files_terminal(&self) -> bool {
        !self.registry.is_empty()
            && self
                .registry
                .values()
                .all(|d| d.is_done() || d.is_poisoned())
    }

    /// Route one decoded QR string. Malformed strings are dropped silently
    /// (counted, and logged when a session logger is attached).
    pub fn process_line(
        &mut self,
        line: &str,
        timestamp: f64,
        sink: &mut dyn OutputSink,
    ) -> Result<()> {
        let packet = match parse_line(line) {
            Ok(packet) => packet,
            Err(err) => {
                self.telemetry.malformed_lines += 1;
                if let Some(logger) = &self.logger {
                    logger.log_wire_reject(timestamp, line, &err.to_string());
                }
                return Ok(());
            }
        };

        match packet {
            Packet::Metadata(meta) => {
                self.telemetry.metadata_sightings += 1;
                // The routing key is derived from the checksum, not trusted
                // from the id field.
                let file_id = crate::chunking::file_id_from_checksum(&meta.file_checksum);

                if let Some(decoder) = self.registry.get_mut(&file_id) {
                    let was_poisoned = decoder.is_poisoned();
                    let attach_failed = decoder.attach_metadata(meta).err();
                    let newly_done = decoder.is_done() && !self.delivered.contains_key(&file_id);
                    if let Some(err) = attach_failed {
                        if !was_poisoned {
                            if let Some(logger) = &self.logger {
                                logger.log_error("METADATA", &err.to_string());
                            }
                            self.emit(TransferEvent::FileFailed {
                                file_id: file_id.clone(),
                                reason: err.to_string(),
                            });
                        }
                    } else if newly_done {
                        // A provisional decoder just got its checksum and
                        // verified on the spot.
                        self.deliver_completed(&file_id, sink)?;
                    }
                } else {
                    let event = TransferEvent::FileDetected {
                        file_id: file_id.clone(),
                        file_name: meta.file_name.clone(),
                        file_size: meta.file_size,
                        chunks_count: meta.chunks_count,
                    };
                    if let Some(logger) = &self.logger {
                        logger.log_file_event(
                            &file_id,
                            &format!(
                                "detected: {} ({} bytes, {} chunks)",
                                meta.file_name, meta.file_size, meta.chunks_count
                            ),
                        );
                    }
                    self.order.push(file_id.clone());
                    self.registry
                        .insert(file_id, FountainDecoder::from_metadata(meta));
                    self.emit(event);
                }
            }
            Packet::Data(pkt) => {
                self.telemetry.data_packets += 1;
                let file_id = pkt.file_id.clone();

                if !self.registry.contains_key(&file_id) {
                    self.order.push(file_id.clone());
                    self.registry.insert(
                        file_id.clone(),
                        FountainDecoder::provisional(&file_id, pkt.chunks_count),
                    );
                }

                let (added, newly_done, newly_poisoned, progress) = {
                    let decoder = match self.registry.get_mut(&file_id) {
                        Some(decoder) => decoder,
                        None => return Ok(()),
                    };
                    let was_poisoned = decoder.is_poisoned();
                    let added = decoder.add_packet(&pkt);
                    (
                        added,
                        decoder.is_done() && !self.delivered.contains_key(&file_id),
                        decoder.is_poisoned() && !was_poisoned,
                        decoder.recovery_progress(),
                    )
                };

                if !added {
                    self.telemetry.ignored_packets += 1;
                    if let Some(logger) = &self.logger {
                        logger.log_packet_ignored(&file_id, pkt.id);
                    }
                    return Ok(());
                }

                self.emit(TransferEvent::FileProgress {
                    file_id: file_id.clone(),
                    recovered: progress.0,
                    total: progress.1,
                });

                if newly_poisoned {
                    let reason = self
                        .registry
                        .get(&file_id)
                        .and_then(|d| d.failure())
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "unknown failure".to_string());
                    if let Some(logger) = &self.logger {
                        logger.log_error("DECODE", &format!("{file_id}: {reason}"));
                    }
                    self.emit(TransferEvent::FileFailed {
                        file_id: file_id.clone(),
                        reason,
                    });
                } else if newly_done {
                    self.deliver_completed(&file_id, sink)?;
                }
            }
        }
        Ok(())
    }

    /// Hand a verified file to the sink. Sink failures surface upward; the
    /// decoder keeps its state either way.
    fn deliver_completed(&mut self, file_id: &str, sink: &mut dyn OutputSink) -> Result<()> {
        let path = {
            let Some(decoder) = self.registry.get(file_id) else {
                return Ok(());
            };
            let (Some(meta), Some(bytes)) = (decoder.metadata(), decoder.finalize_file()) else {
                return Ok(());
            };
            sink.deliver(file_id, meta, bytes)?
        };

        self.delivered.insert(file_id.to_string(), path.clone());
        let decoder = &self.registry[file_id];
        if let Some(meta) = decoder.metadata() {
            if let Some(logger) = &self.logger {
                logger.log_file_event(file_id, &format!("complete → {}", path.display()));
            }
            self.emit(TransferEvent::FileCompleted {
                file_id: file_id.to_string(),
                file_name: meta.file_name.clone(),
                file_size: meta.file_size,
                verified: true,
                output_path: path.display().to_string(),
            });
        }
        Ok(())
    }

    /// Build the end-of-stream summary.
    fn finish(&mut self, cancelled: bool) -> StreamSummary {
        let mut files = Vec::with_capacity(self.order.len());
        for file_id in &self.order {
            let Some(decoder) = self.registry.get(file_id) else {
                continue;
            };
            let metadata = decoder.metadata().cloned();
            let outcome = if decoder.is_done() {
                match (decoder.metadata(), decoder.finalize_file()) {
                    (Some(meta), Some(bytes)) => FileOutcome::Complete {
                        metadata: meta.clone(),
                        bytes: bytes.to_vec(),
                    },
                    _ => continue,
                }
            } else if decoder.is_poisoned() {
                FileOutcome::Poisoned {
                    reason: decoder
                        .failure()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "unknown failure".to_string()),
                }
            } else if let Some(bytes) = decoder.unverified_bytes() {
                FileOutcome::Unverified {
                    chunks_count: decoder.recovery_progress().1,
                    bytes: bytes.to_vec(),
                }
            } else {
                let (recovered, total) = decoder.recovery_progress();
                FileOutcome::Partial {
                    recovered,
                    total,
                    missing: decoder.missing_indices(),
                }
            };

            files.push(FileReport {
                file_id: file_id.clone(),
                metadata,
                output_path: self.delivered.get(file_id).cloned(),
                outcome,
            });
        }

        let summary = StreamSummary {
            files,
            telemetry: self.telemetry.clone(),
            cancelled,
        };
        let (complete, unverified, partial, poisoned) = summary.counts();
        self.emit(TransferEvent::StreamFinished {
            complete,
            unverified,
            partial,
            poisoned,
        });
        summary
    }

    fn emit(&self, event: TransferEvent) {
        if let Some(callback) = &self.events {
            callback(event);
        }
    }
}
