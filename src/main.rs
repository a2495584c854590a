//! Vantage - command-line wrapper around the scoring engine
//!
//! Builds one `ScoringEngine` from layered configuration and runs a single
//! assessment or prints the resolved configuration.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::{self, EnvFilter};
use vantage_core::{
    config::load_settings, ConfigResolver, ConfigurationSummary, EngineConfig,
    PersonalizationContext, Result, ScoreReport, ScoringEngine,
};

#[derive(Parser)]
#[command(name = "vantage")]
#[command(about = "Personalized multi-dimensional scoring for business data", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Engine configuration file (TOML); VANTAGE__* environment variables override it
    #[arg(short, long, global = true, env = "VANTAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Set log level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess a JSON record or list of records
    Assess {
        /// Path to the data file
        data: PathBuf,

        /// Path to a JSON personalization context
        #[arg(long)]
        context: Option<PathBuf>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved dimension configuration
    Summary {
        /// Path to a JSON personalization context to store first
        #[arg(long)]
        context: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

fn read_json(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn read_context(path: Option<&Path>) -> Result<PersonalizationContext> {
    match path {
        Some(path) => Ok(PersonalizationContext::from_value(read_json(path)?)),
        None => Ok(PersonalizationContext::new()),
    }
}

/// Composition root: settings double as the stored key/value source
fn build_engine(config_path: Option<&Path>) -> Result<ScoringEngine> {
    let settings = load_settings(config_path)?;
    let config = EngineConfig::from_settings(&settings)?;
    ScoringEngine::builder()
        .config(config)
        .config_resolver(ConfigResolver::new(Arc::new(settings)))
        .build()
}

fn print_report(report: &ScoreReport) {
    println!(
        "Overall: {:.1}% ({}) - {}",
        report.overall_score * 100.0,
        report.grade,
        if report.meets_threshold {
            "meets threshold"
        } else {
            "below threshold"
        }
    );
    println!("Mode: {}, confidence {:.2}", report.mode, report.confidence);
    println!();
    println!(
        "{:<16} {:>7} {:>7} {:>9}  {:<10}",
        "dimension", "score", "weight", "threshold", "source"
    );
    for (name, d) in &report.dimension_scores {
        println!(
            "{:<16} {:>7.3} {:>7.3} {:>9.3}  {:<10}{}",
            name,
            d.score,
            d.weight,
            d.threshold,
            d.source.to_string(),
            if d.meets_threshold { "" } else { " !" }
        );
    }

    if !report.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for (i, rec) in report.recommendations.iter().enumerate() {
            println!("  {}. {}", i + 1, rec);
        }
    }
    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
}

fn print_summary(summary: &ConfigurationSummary) {
    println!(
        "Mode: {}, overall threshold {:.2}, cached assessments {}",
        summary.mode, summary.overall_threshold, summary.cache_size
    );
    for d in &summary.dimensions {
        println!(
            "  {:<16} weight {:.3} ({:<10}) threshold {:.3} ({:<10}) {}",
            d.name,
            d.weight,
            d.source.to_string(),
            d.threshold,
            d.threshold_source.to_string(),
            d.description
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        match cli.log_level.as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_str().to_lowercase();
        EnvFilter::new(format!("vantage={},vantage_core={}", level, level))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("Vantage v{} starting...", env!("CARGO_PKG_VERSION"));

    let engine = build_engine(cli.config.as_deref())?;

    match cli.command {
        Commands::Assess {
            data,
            context,
            json,
        } => {
            let data = read_json(&data)?;
            let context = read_context(context.as_deref())?;
            let report = engine.assess(&data, &context);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Summary { context, json } => {
            let context = read_context(context.as_deref())?;
            if !context.is_empty() {
                engine.update_personalization(&context);
            }
            let summary = engine.get_configuration_summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
    }

    Ok(())
}
