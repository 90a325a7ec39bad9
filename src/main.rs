mod tracks;
mod web;

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::process::ExitCode;

use crate::tracks::{
    Faction, HistoryPage, Normalizer, SchemaProfile, SourceKind, TrackEngine, TrackFilter,
    DEFAULT_LIVE_CAP,
};
use crate::web::Config;

#[derive(Parser)]
#[command(name = "track-o-mat")]
#[command(about = "Drone track aggregation service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        #[arg(long, default_value = "track-o-mat.yaml")]
        config: String,
    },
    /// Normalize a history file and report dropped records
    Validate {
        file: String,
        #[arg(long, default_value_t = Faction::Defense)]
        faction: Faction,
        /// Identity field, if the file does not use the faction default
        #[arg(long)]
        id_field: Option<String>,
    },
    /// Print statistics, latest positions and routes of a history file
    Summarize {
        file: String,
        #[arg(long, default_value_t = Faction::Defense)]
        faction: Faction,
        #[arg(long)]
        id_field: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        entity_id: Option<String>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        objective: Option<String>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(&config),
        Commands::Validate {
            file,
            faction,
            id_field,
        } => validate(&file, faction, id_field),
        Commands::Summarize {
            file,
            faction,
            id_field,
            search,
            entity_id,
            group,
            objective,
        } => summarize(
            &file,
            faction,
            id_field,
            TrackFilter {
                search,
                entity_id,
                group,
                objective,
            },
        ),
    }
}

fn serve(path: &str) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(web::run_server(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn validate(path: &str, faction: Faction, id_field: Option<String>) -> ExitCode {
    let records = match load_records(path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let profile = SchemaProfile::for_faction(faction).with_id_field(id_field);
    let batch = Normalizer::new(profile).normalize_batch(&records);

    println!(
        "{} records: {} accepted, {} dropped",
        records.len(),
        batch.samples.len(),
        batch.dropped.len()
    );
    for error in &batch.dropped {
        println!("  {}", error);
    }

    if batch.dropped.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn summarize(
    path: &str,
    faction: Faction,
    id_field: Option<String>,
    filter: TrackFilter,
) -> ExitCode {
    let records = match load_records(path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let profile = SchemaProfile::for_faction(faction).with_id_field(id_field);
    let engine = TrackEngine::new(faction, profile, DEFAULT_LIVE_CAP);
    engine.ingest(&records, SourceKind::History);

    let stats = engine.query_stats(&filter);
    println!(
        "{} drones, {} samples, ~{} samples per drone",
        stats.entity_count, stats.sample_count, stats.avg_per_entity
    );

    println!("Latest positions:");
    for sample in engine.query_latest(&filter) {
        let position = sample.position();
        let altitude = sample
            .altitude()
            .map(|alt| format!(" alt {:.1}", alt))
            .unwrap_or_default();
        let seen = match sample.captured_at() {
            Some(at) => format!("captured {}", at.to_rfc3339()),
            None => format!("received {}", sample.received_at().to_rfc3339()),
        };
        println!(
            "  {} @ {:.5}, {:.5}{} ({}, update {})",
            sample.entity_id(),
            position.lat,
            position.lng,
            altitude,
            seen,
            sample.update_id()
        );
    }

    println!("Routes:");
    for (entity_id, route) in engine.query_routes(&filter) {
        let note = if route.len() < 2 { " (no path)" } else { "" };
        println!("  {}: {} samples{}", entity_id, route.len(), note);
    }

    ExitCode::SUCCESS
}

/// Accepts a history page object or a bare array of records.
fn load_records(path: &str) -> Result<Vec<Value>, String> {
    let content =
        fs::read_to_string(path).map_err(|e| format!("Error reading file {}: {}", path, e))?;
    let value: Value =
        serde_json::from_str(&content).map_err(|e| format!("Parse error: {}", e))?;

    match value {
        Value::Array(records) => Ok(records),
        other => serde_json::from_value::<HistoryPage>(other)
            .map(|page| page.data)
            .map_err(|e| format!("Not a history page: {}", e)),
    }
}
