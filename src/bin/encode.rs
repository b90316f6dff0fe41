use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use std::path::PathBuf;

use qr_fountain_files::chunking::chunks_count;
use qr_fountain_files::config::{Density, EncoderConfig, ErrorCorrection};
use qr_fountain_files::fountain_encoder::{describe_file, FountainEncoder};
use qr_fountain_files::qr_render::{check_capacity, frame_plan, render_frames_to_dir};
use qr_fountain_files::video::mux_frames_to_video;

#[derive(Parser, Debug)]
#[command(author, version, about = "Encode files into a QR fountain video", long_about = None)]
struct Args {
    /// Input files to transport (all share one video)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output video file
    #[arg(short, long, default_value = "qr_transfer.mp4")]
    output: PathBuf,

    /// Video frame rate
    #[arg(long, default_value_t = 10)]
    fps: u32,

    /// Bytes per source chunk
    #[arg(long, default_value_t = 1024)]
    chunk_size: usize,

    /// Packet redundancy factor (>= 1.0)
    #[arg(short, long, default_value_t = 1.5)]
    redundancy: f64,

    /// QR symbol density preset
    #[arg(short, long, value_enum, default_value = "medium")]
    density: Density,

    /// QR error correction level
    #[arg(short, long, value_enum, default_value = "l")]
    error_correction: ErrorCorrection,

    /// Disable the systematic prefix
    #[arg(long)]
    no_systematic: bool,

    /// Keep the rendered PNG frames next to the video
    #[arg(long)]
    keep_frames: bool,

    /// Maximum number of render threads
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = EncoderConfig {
        fps: args.fps,
        chunk_size: args.chunk_size,
        redundancy: args.redundancy,
        density: args.density,
        error_correction: args.error_correction,
        systematic: !args.no_systematic,
    };
    config.validate()?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads.unwrap_or_else(num_cpus::get))
        .build_global()
        .context("failed to configure render thread pool")?;

    println!("QR Fountain Encoder");
    println!("===================");
    println!("Output: {}", args.output.display());
    println!(
        "chunk_size={} redundancy={} density={:?} ec={} fps={} systematic={}",
        config.chunk_size,
        config.redundancy,
        config.density,
        config.error_correction.letter(),
        config.fps,
        config.systematic,
    );
    println!();

    // Phase 1: build the frame plan for every input file. Packet ids keep
    // counting across files so a receiver can de-duplicate globally.
    let mut all_lines: Vec<String> = Vec::new();
    let mut id_base = 0u32;

    for input in &args.inputs {
        let data = std::fs::read(input)
            .with_context(|| format!("failed to read {}", input.display()))?;
        let file_name = input
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("file.bin");
        let file_type = mime_guess::from_path(input)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        let k = chunks_count(data.len(), config.chunk_size);
        let packet_count = (config.redundancy * k as f64).ceil() as u32;
        let meta = describe_file(file_name, &file_type, &data, config.chunk_size, packet_count);
        let encoder = FountainEncoder::new(&data, &meta.file_id, config.chunk_size, config.systematic)
            .with_context(|| format!("cannot encode {}", input.display()))?
            .with_id_base(id_base);

        let meta_line = meta.to_wire_line();
        let packet_lines: Vec<String> = encoder
            .packets(config.redundancy)
            .map(|p| p.to_wire_line())
            .collect();

        let longest = packet_lines
            .iter()
            .map(String::len)
            .max()
            .unwrap_or(0)
            .max(meta_line.len());
        if check_capacity(longest, &config)? {
            eprintln!(
                "⚠️ {}: packet lines use over 80% of QR capacity ({} of {} bytes); consider a higher density or smaller chunks",
                file_name,
                longest,
                config.symbol_capacity(),
            );
        }

        println!(
            "📄 {} → {} ({} bytes, {} chunks, packet ids {}..{})",
            input.display(),
            meta.file_id,
            meta.file_size,
            meta.chunks_count,
            id_base,
            id_base + packet_count,
        );

        all_lines.extend(frame_plan(&meta_line, &packet_lines));
        id_base += packet_count;
    }

    // Phase 2: render frames in parallel.
    let frames_dir = if args.keep_frames {
        args.output.with_extension("frames")
    } else {
        std::env::temp_dir().join(format!("qff_frames_{}", std::process::id()))
    };
    println!("\nRendering {} frames...", all_lines.len());
    let bar = ProgressBar::new(all_lines.len() as u64);
    render_frames_to_dir(&all_lines, &config, &frames_dir, || bar.inc(1))?;
    bar.finish();

    // Phase 3: mux into a video.
    println!("Muxing video at {} fps...", config.fps);
    mux_frames_to_video(&frames_dir, config.fps, &args.output)?;
    if !args.keep_frames {
        let _ = std::fs::remove_dir_all(&frames_dir);
    }

    let duration = all_lines.len() as f64 / config.fps as f64;
    println!(
        "\n✅ Wrote {} ({} frames, {:.1}s, {} files)",
        args.output.display(),
        all_lines.len(),
        duration,
        args.inputs.len(),
    );
    if args.keep_frames {
        println!("Frames kept in {}", frames_dir.display());
    }
    Ok(())
}
