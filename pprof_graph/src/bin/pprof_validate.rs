use pprof_graph::{CallGraph, Profile};
use std::collections::HashSet;
use std::env;
use std::fs::File;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <profile.json>", args[0]);
        return ExitCode::from(2);
    }

    let path = &args[1];

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening '{}': {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let profile = match Profile::parse(file) {
        Ok(profile) => profile,
        Err(e) => {
            eprintln!("Invalid profile '{}': {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let graph = match CallGraph::build(&profile, &HashSet::new()) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Invalid profile '{}': {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    println!("Valid profile: {}", path);
    for (index, sample_type) in profile.sample_types.iter().enumerate() {
        let marker = if index == profile.default_metric() { " (default)" } else { "" };
        let unit = match sample_type.unit_kind() {
            Ok(kind) => kind.to_string(),
            Err(e) => format!("{} [{}]", sample_type.unit, e),
        };
        println!("  Sample type {}: {} / {}{}", index, sample_type.name, unit, marker);
    }
    println!("  Functions: {}", profile.functions.len());
    println!("  Locations: {}", profile.locations.len());
    println!("  Samples: {}", profile.samples.len());
    println!("  Calls: {}", graph.len());
    ExitCode::SUCCESS
}
