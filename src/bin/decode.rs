use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use qr_fountain_files::config::DecoderConfig;
use qr_fountain_files::dispatch::{DirectorySink, FileOutcome, FrameDriver, StreamSummary};
use qr_fountain_files::error_logger::SessionLogger;
use qr_fountain_files::events::{ConsoleOutputHandler, EventCallback, OutputHandler};
use qr_fountain_files::frame_source::JsonlFrameSource;
use qr_fountain_files::report::{write_partial_sidecar, IntegrityReport};
use qr_fountain_files::video::{probe_video, VideoFrameSource};

#[derive(Parser, Debug)]
#[command(author, version, about = "Recover files from a QR fountain video", long_about = None)]
struct Args {
    /// Input video, or a .jsonl scan stream from a previous extraction pass
    input: PathBuf,

    /// Output directory for recovered files
    #[arg(short, long, default_value = "decoded_files")]
    output: PathBuf,

    /// Frames per second to sample from the video
    #[arg(short, long, default_value_t = 1.0)]
    frame_rate: f64,

    /// Seek forward once every known file has finished
    #[arg(long)]
    fast_scan: bool,

    /// Skip writing integrity_report.json
    #[arg(long)]
    no_report: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let code = run(&args)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn run(args: &Args) -> Result<i32> {
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let logger = Arc::new(
        SessionLogger::in_dir(&args.output, "qff_decode.log")
            .context("cannot open session log")?,
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&cancel);
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    let console = ConsoleOutputHandler;
    let events: EventCallback = Box::new(move |event| console.handle_event(&event));

    let config = DecoderConfig {
        frame_rate: args.frame_rate,
        fast_scan: args.fast_scan,
    };
    let mut driver = FrameDriver::new(config)
        .with_cancel_flag(Arc::clone(&cancel))
        .with_events(events)
        .with_logger(Arc::clone(&logger));
    let mut sink = DirectorySink::new(&args.output);

    let is_jsonl = args.input.extension().and_then(|s| s.to_str()) == Some("jsonl");
    let summary = if is_jsonl {
        println!("🌊 Replaying scan stream: {}", args.input.display());
        let mut source = JsonlFrameSource::open(&args.input)
            .with_context(|| format!("cannot open {}", args.input.display()))?;
        let summary = driver.run(&mut source, &mut sink)?;
        if source.skipped_lines > 0 {
            logger.log_warning(
                "JSONL",
                &format!("skipped {} unparseable lines", source.skipped_lines),
            );
        }
        summary
    } else {
        let info = probe_video(&args.input)?;
        println!(
            "📺 Video: {}x{}, {:.1}fps, {:.1}s, {} frames",
            info.width, info.height, info.fps, info.duration, info.total_frames
        );
        let work_dir = args.output.join(".frames_tmp");
        let mut source = VideoFrameSource::open(&args.input, args.frame_rate, &work_dir)?;
        println!(
            "Sampling {} frames at {} fps",
            source.frame_count(),
            args.frame_rate
        );
        driver.run(&mut source, &mut sink)?
    };

    finish(args, &logger, &summary)?;
    Ok(summary.exit_code())
}

/// Write unverified buffers, partial sidecars and the integrity report.
fn finish(args: &Args, logger: &SessionLogger, summary: &StreamSummary) -> Result<()> {
    let mut report = IntegrityReport::new(&args.output);

    for file in &summary.files {
        match &file.outcome {
            FileOutcome::Complete { metadata, bytes } => {
                let path = file
                    .output_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                report.add_file(
                    &file.file_id,
                    &metadata.file_name,
                    &path,
                    bytes,
                    &metadata.file_checksum,
                    true,
                );
            }
            FileOutcome::Unverified { bytes, chunks_count } => {
                // Recovered without metadata: no name, no truncation, no
                // checksum. Still worth keeping.
                let path = args.output.join(format!("{}.bin", file.file_id));
                std::fs::write(&path, bytes)?;
                logger.log_file_event(
                    &file.file_id,
                    &format!("unverified ({chunks_count} chunks) → {}", path.display()),
                );
                println!(
                    "⚠️ Unverified file {} written to {} (no metadata seen; padding not stripped)",
                    file.file_id,
                    path.display()
                );
                report.add_file(
                    &file.file_id,
                    &format!("{}.bin", file.file_id),
                    &path.display().to_string(),
                    bytes,
                    "",
                    false,
                );
            }
            FileOutcome::Partial {
                recovered,
                total,
                missing,
            } => {
                let sidecar = write_partial_sidecar(
                    &args.output,
                    &file.file_id,
                    file.metadata.as_ref(),
                    *recovered,
                    *total,
                    missing,
                )?;
                println!(
                    "⚠️ Partial file {}: {}/{} chunks, progress saved to {}",
                    file.file_id,
                    recovered,
                    total,
                    sidecar.display()
                );
            }
            FileOutcome::Poisoned { reason } => {
                logger.log_error("FINAL", &format!("{}: {}", file.file_id, reason));
            }
        }
    }

    if !args.no_report && !report.files.is_empty() {
        let path = report.write(&args.output)?;
        println!("📊 Integrity report: {}", path.display());
    }

    let t = &summary.telemetry;
    println!(
        "\nFrames scanned: {} | decoded strings: {} | malformed: {} | ignored packets: {}",
        t.frames_scanned, t.decoded_strings, t.malformed_lines, t.ignored_packets
    );
    if summary.cancelled {
        println!("Interrupted: in-flight files were discarded");
    }
    println!("📁 Recovered files are in {}", args.output.display());
    Ok(())
}
