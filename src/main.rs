//! Batch tape recovery
//!
//! Usage:
//!   comet-tape [--jobs N] [--json] [--config FILE] [--output-dir DIR] <capture>...
//!
//! Writes `<capture>.TAP` and `<capture>.TAP.meta` for every input. Files are
//! processed in parallel; each file's channel surveys share the same pool.
//!
//! Exit status: 0 when valid tape data was found in every file, 1 when a file
//! had no usable channel or could not be read, 2 for usage errors. Invalid
//! records do not fail a file; they are counted in its report.

use clap::Parser;
use comet_tape::{process_file, DecoderConfig, TapeSummary};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Audio captures to decode (WAV or FLAC)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Parallel workers (default: CPU-1)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Emit one JSON object per file (JSONL)
    #[arg(long)]
    json: bool,

    /// JSON file with decoder parameter overrides
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the output files (default: next to each input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Do not write the .TAP.meta archival metadata
    #[arg(long)]
    no_metadata: bool,
}

#[derive(Debug, Serialize)]
struct FileReport {
    path: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<TapeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    processing_ms: f32,
}

fn default_jobs() -> usize {
    let n = std::thread::available_parallelism().map(|v| v.get()).unwrap_or(1);
    std::cmp::max(1, n.saturating_sub(1))
}

fn load_config(path: Option<&Path>) -> Result<DecoderConfig, String> {
    match path {
        None => Ok(DecoderConfig::default()),
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("{}: {}", path.display(), e))?;
            DecoderConfig::from_json(&text).map_err(|e| format!("{}: {}", path.display(), e))
        }
    }
}

fn run_one(path: &Path, args: &Args, config: &DecoderConfig) -> FileReport {
    let t0 = Instant::now();
    let outcome = process_file(path, args.output_dir.as_deref(), !args.no_metadata, config);
    let processing_ms = t0.elapsed().as_secs_f32() * 1000.0;

    match outcome {
        Ok(processed) => {
            let summary = processed.result.summary();
            FileReport {
                path: path.display().to_string(),
                ok: true,
                tap: Some(processed.tap_path.display().to_string()),
                summary: Some(summary),
                error: None,
                processing_ms,
            }
        }
        Err(e) => {
            log::warn!("{}: {}", path.display(), e);
            FileReport {
                path: path.display().to_string(),
                ok: false,
                tap: None,
                summary: None,
                error: Some(e.to_string()),
                processing_ms,
            }
        }
    }
}

fn print_report(report: &FileReport, json: bool) {
    if json {
        match serde_json::to_string(report) {
            Ok(line) => println!("{}", line),
            Err(e) => log::error!("Cannot serialize report for {}: {}", report.path, e),
        }
        return;
    }
    match (&report.summary, &report.error) {
        (Some(s), _) => println!(
            "{}: {} records ({} invalid), {} tape marks, channel {}, quality {:.3}, {:.0} ms",
            report.path,
            s.records,
            s.invalid_records,
            s.tape_marks,
            s.selected_channel,
            s.quality,
            report.processing_ms
        ),
        (None, Some(error)) => println!("{}: FAILED: {}", report.path, error),
        (None, None) => println!("{}: FAILED", report.path),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return ExitCode::from(2);
        }
    };
    if let Some(dir) = &args.output_dir {
        if !dir.is_dir() {
            eprintln!("ERROR: output directory {} does not exist", dir.display());
            return ExitCode::from(2);
        }
    }

    let jobs = args.jobs.map(|j| j.max(1)).unwrap_or_else(default_jobs);
    log::info!("Batch: {} files, jobs={}", args.files.len(), jobs);

    let pool = match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("ERROR: cannot build thread pool: {}", e);
            return ExitCode::from(1);
        }
    };

    let t0 = Instant::now();
    let reports: Vec<FileReport> = pool.install(|| {
        args.files
            .par_iter()
            .map(|path| run_one(path, &args, &config))
            .collect()
    });

    for report in &reports {
        print_report(report, args.json);
    }

    let failed = reports.iter().filter(|r| !r.ok).count();
    log::info!(
        "Done: {} ok, {} failed in {:.1} s",
        reports.len() - failed,
        failed,
        t0.elapsed().as_secs_f32()
    );

    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
