//! Quicksilver HMR CLI
//!
//! Inspect a module graph's entrypoints and replay captured HMR payload
//! streams against it without executing any module code.

use anyhow::Context;
use clap::{Parser, Subcommand};
use quicksilver_hmr::graph::{all_entrypoints, entrypoints_of_file};
use quicksilver_hmr::payload::normalize_file_path;
use quicksilver_hmr::replay::{payload_lines, GraphFixture, RecordingRunner};
use quicksilver_hmr::{HmrConfig, HmrHandler, Payload, VERSION};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quicksilver-hmr")]
#[command(author, version, about = "Hot module replacement coordinator for the Quicksilver module runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the entrypoints a full reload would re-import
    Entrypoints {
        /// Module graph fixture
        #[arg(long)]
        graph: PathBuf,
        /// Only entrypoints depending on this changed file
        #[arg(long)]
        file: Option<String>,
    },

    /// Replay a JSON Lines payload stream against a module graph
    Replay {
        /// Module graph fixture
        #[arg(long)]
        graph: PathBuf,
        /// Payloads, one JSON object per line
        #[arg(long)]
        payloads: PathBuf,
        /// Make imports, patches or listeners for this id fail (repeatable)
        #[arg(long, value_name = "ID")]
        fail_on: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let result = match load_config(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Entrypoints { graph, file } => show_entrypoints(&graph, file.as_deref(), &config),
            Commands::Replay { graph, payloads, fail_on } => {
                replay(&graph, &payloads, &fail_on, &config).await
            }
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(version = VERSION, "logging initialized");
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HmrConfig> {
    match path {
        Some(path) => HmrConfig::from_json_file(path)
            .with_context(|| format!("loading config '{}'", path.display())),
        None => Ok(HmrConfig::default()),
    }
}

fn load_graph(path: &Path) -> anyhow::Result<GraphFixture> {
    GraphFixture::from_json_file(path).with_context(|| format!("loading graph '{}'", path.display()))
}

fn show_entrypoints(graph: &Path, file: Option<&str>, config: &HmrConfig) -> anyhow::Result<()> {
    let cache = load_graph(graph)?.to_cache();
    let entrypoints = match file {
        Some(file) => entrypoints_of_file(&cache, &normalize_file_path(file, &config.ids)),
        None => all_entrypoints(&cache),
    };

    if entrypoints.is_empty() {
        eprintln!("no entrypoints affected");
    }
    for id in entrypoints {
        println!("{}", id);
    }
    Ok(())
}

async fn replay(
    graph: &Path,
    payloads: &Path,
    fail_on: &[String],
    config: &HmrConfig,
) -> anyhow::Result<()> {
    let fixture = load_graph(graph)?;
    let file = File::open(payloads)
        .with_context(|| format!("opening payloads '{}'", payloads.display()))?;
    let lines = payload_lines(BufReader::new(file))?;

    let runner = Arc::new(RecordingRunner::new(&fixture));
    for target in fail_on {
        runner.fail_on(target.clone());
    }
    let handler = HmrHandler::with_config(Arc::clone(&runner), config)?;

    // Enqueue the whole stream at once, like a burst from the transport
    let pending: Vec<_> = lines
        .iter()
        .map(|line| (describe(line), handler.handle_json(line)))
        .collect();

    let mut failures = 0usize;
    for (index, (kind, result)) in pending.into_iter().enumerate() {
        if let Err(e) = result.await {
            failures += 1;
            eprintln!("payload #{} ({}) failed: {}", index + 1, kind, e);
        }
    }

    for event in runner.log().take() {
        println!("{}", serde_json::to_string(&event)?);
    }

    eprintln!(
        "replayed {} payloads, {} failed, {} modules cached",
        lines.len(),
        failures,
        runner.modules().len()
    );
    Ok(())
}

/// Payload kind for progress output, or `invalid` when it does not decode
fn describe(line: &str) -> &'static str {
    Payload::from_json(line).map(|p| p.kind()).unwrap_or("invalid")
}
