//! Activity Harness CLI Module
//!
//! Command-line interface for running comparisons and inspecting artifacts.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::artifacts::{load_artifact, restore_classifier, ArtifactFormat};
use crate::config::HarnessConfig;
use crate::dataset::Dataset;
use crate::pipeline::Harness;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(235, 110, 110) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<16} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "activity-harness")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train, compare and persist classifiers on a shared dataset split")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train and compare every configured model
    Run {
        /// Feature CSV produced by the descriptor stage
        #[arg(short, long)]
        data: PathBuf,

        /// Label column name
        #[arg(short, long, default_value = "activity")]
        target: String,

        /// Run configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Override the artifact directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the artifact format (binary, json)
        #[arg(long)]
        format: Option<String>,

        /// Train models one at a time
        #[arg(long)]
        sequential: bool,
    },

    /// Validate a configuration file and list its models
    Check {
        /// Run configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Show the metadata of a saved model artifact
    Inspect {
        /// Artifact file (.bin or .json)
        #[arg(short, long)]
        artifact: PathBuf,
    },

    /// Show dataset shape and class balance
    Info {
        /// Feature CSV
        #[arg(short, long)]
        data: PathBuf,

        /// Label column name
        #[arg(short, long, default_value = "activity")]
        target: String,
    },
}

fn parse_format(format: &str) -> anyhow::Result<ArtifactFormat> {
    match format {
        "binary" | "bin" => Ok(ArtifactFormat::Binary),
        "json" => Ok(ArtifactFormat::Json),
        _ => anyhow::bail!("Invalid artifact format: {}", format),
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(
    data_path: &Path,
    target: &str,
    config_path: &Path,
    output: Option<&Path>,
    format: Option<&str>,
    sequential: bool,
) -> anyhow::Result<()> {
    section("Run");

    let mut config = HarnessConfig::load(config_path)?;
    if let Some(dir) = output {
        config.output_dir = dir.to_path_buf();
    }
    if let Some(format) = format {
        config.artifact_format = parse_format(format)?;
    }
    if sequential {
        config.parallel = false;
    }

    step_run("Loading data");
    let start = Instant::now();
    let dataset = Dataset::load_csv(data_path, target)?;
    step_done(&format!(
        "{} rows × {} features in {:?}",
        dataset.n_samples(),
        dataset.n_features(),
        start.elapsed()
    ));

    step_run(&format!("Training {} models", config.models.len().to_string().cyan()));
    let outcome = Harness::new(config).run(&dataset)?;
    step_done(&format!("{:.2}s", outcome.total_time_secs));

    println!();
    for line in outcome.report.lines() {
        println!("  {}", line);
    }
    println!();

    for saved in &outcome.artifacts {
        match &saved.result {
            Ok(path) => println!("  {} {}", ok("✓"), path.display()),
            Err(e) => println!("  {} {} {}", bad("✗"), saved.model_id, dim(&e.to_string())),
        }
    }
    if let Some(e) = &outcome.artifacts_error {
        println!("  {} {}", bad("✗"), dim(&e.to_string()));
    }

    let best = outcome.best()?;
    println!();
    kv("Best model", &best.model_id);
    kv(best.metric.name(), &format!("{:.4}", best.score));
    println!();

    Ok(())
}

pub fn cmd_check(config_path: &Path) -> anyhow::Result<()> {
    section("Check");

    let config = HarnessConfig::load(config_path)?;
    kv("Test fraction", &config.test_fraction.to_string());
    kv("CV folds", &config.cv_folds.to_string());
    kv("Ranking", config.ranking_metric.name());
    kv("Output", &config.output_dir.display().to_string());
    println!();
    for entry in &config.models {
        println!(
            "  {} {:<20} {} {}",
            ok("✓"),
            entry.id,
            entry.family.name().cyan(),
            dim(&format!("seed {}", entry.seed))
        );
    }
    println!();

    Ok(())
}

pub fn cmd_inspect(artifact_path: &Path) -> anyhow::Result<()> {
    section("Inspect");

    let artifact = load_artifact(artifact_path)?;
    kv("Model", &artifact.model_id);
    kv("Type", &artifact.model_type);
    kv("Saved", &artifact.saved_at);
    kv("Version", &artifact.format_version.to_string());
    kv("Payload", &format!("{} bytes", artifact.payload.len()));
    kv("Checksum", &format!("{:016x}", artifact.checksum));

    let model = restore_classifier(&artifact)?;
    let classes: Vec<String> = model.classes().iter().map(|c| c.to_string()).collect();
    kv("Classes", &classes.join(", "));
    println!();

    Ok(())
}

pub fn cmd_info(data_path: &Path, target: &str) -> anyhow::Result<()> {
    section("Info");

    let dataset = Dataset::load_csv(data_path, target)?;
    kv("Samples", &dataset.n_samples().to_string());
    kv("Features", &dataset.n_features().to_string());
    println!();
    for (label, count) in dataset.class_counts() {
        let share = count as f64 / dataset.n_samples() as f64 * 100.0;
        println!(
            "  {:<16} {} {}",
            muted(&format!("class {}", label)),
            count.to_string().white(),
            dim(&format!("({:.1}%)", share))
        );
    }
    println!();

    Ok(())
}

/// Dispatch a parsed command line
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run { data, target, config, output, format, sequential } => {
            cmd_run(&data, &target, &config, output.as_deref(), format.as_deref(), sequential)
        }
        Commands::Check { config } => cmd_check(&config),
        Commands::Inspect { artifact } => cmd_inspect(&artifact),
        Commands::Info { data, target } => cmd_info(&data, &target),
    }
}
