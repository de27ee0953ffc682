//! Lay out a flame graph for a decoded pprof profile.
//!
//! This binary reads a profile in its JSON form (optionally gzip or zstd
//! compressed) and writes the flame graph boxes as newline-delimited JSON,
//! one `box` record per line, ready for a renderer to draw.
//!
//! # Usage
//!
//! ```bash
//! pprof_flame cpu.json -o cpu.ndjson
//! pprof_flame heap.json.gz --sample inuse_space --focus 12
//! pprof_flame cpu.json --settings view.json --ignore 3 --ignore 7 --lines 12
//! ```

use clap::Parser;
use pprof_flame::input::load_profile;
use pprof_flame::pprof_graph::{FlameWriter, FunctionId, Session};
use pprof_flame::settings::{Overrides, SettingsFile};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "pprof_flame")]
#[command(about = "Lay out a flame graph for a pprof profile as NDJSON")]
#[command(version)]
struct Args {
    /// Input profile (JSON, optionally gzip or zstd compressed)
    profile: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with base view settings
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Sample type to show, by index or name
    #[arg(long)]
    sample: Option<String>,

    /// Function ID to focus on
    #[arg(long)]
    focus: Option<FunctionId>,

    /// Function ID whose samples are left out (repeatable)
    #[arg(long)]
    ignore: Vec<FunctionId>,

    /// Also emit the per-line cost table of this function ID
    #[arg(long)]
    lines: Option<FunctionId>,
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let profile = load_profile(&args.profile).map_err(|e| {
        format!(
            "Failed to read profile '{}': {}",
            args.profile.display(),
            e
        )
    })?;

    let file = match &args.settings {
        Some(path) => SettingsFile::load(path)?,
        None => SettingsFile::default(),
    };
    let overrides = Overrides {
        sample: args.sample,
        focus: args.focus,
        ignore: args.ignore,
    };
    let settings = overrides.apply(file, &profile)?;
    let sample_type = profile
        .sample_types
        .get(settings.sample)
        .map(|t| t.name.clone())
        .ok_or_else(|| format!("No sample type at index {}", settings.sample))?;

    let mut session = Session::new(profile, settings)?;
    let boxes = session.boxes()?;

    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path).map_err(|e| {
            format!("Failed to create output file '{}': {}", path.display(), e)
        })?),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = FlameWriter::new(BufWriter::new(output));
    writer.write_boxes(&boxes)?;

    if let Some(func) = args.lines {
        let rows = session.line_costs(func)?;
        if rows.is_empty() {
            eprintln!("No line costs for function {}", func);
        }
        writer.write_lines(rows)?;
    }

    writer.flush()?;

    eprintln!(
        "Laid out {} boxes for '{}' ({}, total {})",
        boxes.len(),
        args.profile.display(),
        sample_type,
        session.total_cost()
    );

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
