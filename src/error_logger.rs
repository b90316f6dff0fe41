//! Append-only session log.
//!
//! Wire rejects and codec anomalies are dropped silently on the console but
//! recorded here so a bad capture session can be diagnosed afterwards.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use chrono::Utc;

pub struct SessionLogger {
    log_file: Mutex<std::fs::File>,
}

impl SessionLogger {
    pub fn new(log_path: &str) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let logger = Self {
            log_file: Mutex::new(file),
        };
        logger.log_info("=== NEW SESSION STARTED ===");
        Ok(logger)
    }

    /// Open a log in `dir`, falling back to the temp dir when `dir` is not
    /// writable.
    pub fn in_dir(dir: &std::path::Path, name: &str) -> Result<Self, std::io::Error> {
        let path = dir.join(name);
        Self::new(&path.to_string_lossy()).or_else(|_| {
            let fallback = std::env::temp_dir().join(name);
            Self::new(&fallback.to_string_lossy())
        })
    }

    pub fn log_error(&self, context: &str, error: &str) {
        self.write_log("ERROR", context, error);
    }

    pub fn log_warning(&self, context: &str, message: &str) {
        self.write_log("WARN", context, message);
    }

    pub fn log_info(&self, message: &str) {
        self.write_log("INFO", "SYSTEM", message);
    }

    pub fn log_debug(&self, context: &str, details: &str) {
        self.write_log("DEBUG", context, details);
    }

    pub fn log_phase(&self, phase: &str, details: &str) {
        self.write_log("PHASE", phase, details);
    }

    /// A QR string that did not parse as a packet. The line is arbitrary
    /// scanner output, so truncation must respect char boundaries.
    pub fn log_wire_reject(&self, frame_timestamp: f64, line: &str, reason: &str) {
        let preview = match line.char_indices().nth(80) {
            Some((cut, _)) => format!("{}... ({} bytes total)", &line[..cut], line.len()),
            None => line.to_string(),
        };
        self.write_log(
            "WIRE",
            "REJECT",
            &format!("t={frame_timestamp:.2}s: {reason} | {preview}"),
        );
    }

    /// A parsed packet that its decoder refused (duplicate, terminal state,
    /// mismatched parameters).
    pub fn log_packet_ignored(&self, file_id: &str, packet_id: u32) {
        self.write_log(
            "PACKET",
            file_id,
            &format!("ignored packet id {packet_id}"),
        );
    }

    pub fn log_file_event(&self, file_id: &str, message: &str) {
        self.write_log("FILE", file_id, message);
    }

    fn write_log(&self, level: &str, context: &str, message: &str) {
        if let Ok(mut file) = self.log_file.lock() {
            let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
            let log_line = format!("[{}] {} [{}]: {}\n", timestamp, level, context, message);
            let _ = file.write_all(log_line.as_bytes());
            let _ = file.flush();
        }
    }
}
