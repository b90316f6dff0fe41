//! Progress and lifecycle events.
//!
//! The pipeline stages report through a callback rather than printing, so
//! the binaries can route the same events to the console, the session log or
//! a progress bar without the core knowing which.

#[derive(Debug, Clone)]
pub enum TransferEvent {
    PhaseStarted {
        phase: u8,
        description: String,
    },
    Progress {
        phase: u8,
        current: usize,
        total: usize,
        message: String,
    },
    PhaseCompleted {
        phase: u8,
        duration_ms: u64,
    },
    /// First sighting of a file in the stream.
    FileDetected {
        file_id: String,
        file_name: String,
        file_size: u64,
        chunks_count: u32,
    },
    FileProgress {
        file_id: String,
        recovered: u32,
        total: u32,
    },
    FileCompleted {
        file_id: String,
        file_name: String,
        file_size: u64,
        verified: bool,
        output_path: String,
    },
    FileFailed {
        file_id: String,
        reason: String,
    },
    StreamFinished {
        complete: usize,
        unverified: usize,
        partial: usize,
        poisoned: usize,
    },
    SystemError {
        context: String,
        error: String,
    },
}

pub type EventCallback = Box<dyn Fn(TransferEvent) + Send + Sync>;

pub trait OutputHandler {
    fn handle_event(&self, event: &TransferEvent);
}

pub struct ConsoleOutputHandler;

impl OutputHandler for ConsoleOutputHandler {
    fn handle_event(&self, event: &TransferEvent) {
        match event {
            TransferEvent::PhaseStarted { phase, description } => {
                println!("Phase {}: {}", phase, description);
            }
            TransferEvent::Progress { phase, current, total, message } => {
                println!("Phase {} [{}/{}]: {}", phase, current, total, message);
            }
            TransferEvent::PhaseCompleted { phase, duration_ms } => {
                println!("Phase {} completed in {}ms", phase, duration_ms);
            }
            TransferEvent::FileDetected { file_id, file_name, file_size, chunks_count } => {
                println!(
                    "📄 New file {}: {} ({} bytes, {} chunks)",
                    file_id, file_name, file_size, chunks_count
                );
            }
            TransferEvent::FileProgress { file_id, recovered, total } => {
                let pct = (*recovered as f64 / *total as f64 * 100.0).round();
                println!("⏳ {}: {}/{} chunks ({}%)", file_id, recovered, total, pct);
            }
            TransferEvent::FileCompleted { file_id, file_name, file_size, verified, output_path } => {
                let status = if *verified { "✅" } else { "⚠️" };
                println!(
                    "{} File {} complete: {} ({} bytes) → {}",
                    status, file_id, file_name, file_size, output_path
                );
            }
            TransferEvent::FileFailed { file_id, reason } => {
                eprintln!("❌ File {} failed: {}", file_id, reason);
            }
            TransferEvent::StreamFinished { complete, unverified, partial, poisoned } => {
                println!(
                    "Stream finished: {} complete, {} unverified, {} partial, {} poisoned",
                    complete, unverified, partial, poisoned
                );
            }
            TransferEvent::SystemError { context, error } => {
                eprintln!("Error in {}: {}", context, error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn callback_receives_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let callback: EventCallback = Box::new(move |event| {
            if matches!(event, TransferEvent::FileProgress { .. }) {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        callback(TransferEvent::FileProgress {
            file_id: "a1b2c3d4".to_string(),
            recovered: 3,
            total: 10,
        });
        callback(TransferEvent::PhaseCompleted { phase: 1, duration_ms: 5 });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
