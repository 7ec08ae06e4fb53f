//! DeckForge CLI - prepare / build bridge for the analysis workflow
//!
//! Commands: prepare, build, convert, validate
//! Outputs JSON to stdout, logs and the text report to stderr
//! Returns 2 on validation or compliance failure, 1 on anything else

use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use deckforge_core::{
    handoff::{load_deck, Handoff},
    logging::init_logging,
    BuildPipeline, ManifestBuilder, PipelineError, RunConfig,
};

#[derive(Parser)]
#[command(name = "deckforge-cli")]
#[command(about = "DeckForge CLI - Dashboard Insight Deck Compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Run configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Working directory for the manifest and insights (overrides config)
    #[arg(short, long, global = true)]
    work_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the page manifest from an export directory
    Prepare {
        /// Export directory of PNG pages
        #[arg(short, long)]
        source: PathBuf,
    },

    /// Build the deck from the manifest and insights
    Build {
        /// Output document path
        #[arg(short, long)]
        output: PathBuf,

        /// Insights file (default: <work_dir>/insights.json)
        #[arg(short, long)]
        insights: Option<PathBuf>,
    },

    /// Prepare, wait for the analysis, then build
    Convert {
        #[arg(short, long)]
        source: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long)]
        insights: Option<PathBuf>,
    },

    /// Schema-check insights against the manifest without building
    Validate {
        #[arg(short, long)]
        insights: Option<PathBuf>,
    },
}

fn emit(value: serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()));
}

fn fail(error: &PipelineError) -> ExitCode {
    let code = match error {
        PipelineError::Schema(_) | PipelineError::Layout(_) => 2, // Validation failure
        _ => 1,
    };
    let mut output = json!({ "success": false, "error": error.to_string() });
    if let PipelineError::Schema(schema) = error {
        output["violations"] = json!(schema.violations());
    }
    emit(output);
    ExitCode::from(code)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match RunConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            emit(json!({ "success": false, "error": format!("Failed to load config: {}", e) }));
            return ExitCode::FAILURE;
        }
    };
    if let Some(work_dir) = cli.work_dir {
        config.work_dir = work_dir;
    }

    let result = match cli.command {
        Commands::Prepare { source } => prepare(&config, &source, None).map(|()| ExitCode::SUCCESS),
        Commands::Build { output, insights } => build(&config, insights, &output, false),
        Commands::Convert { source, output, insights } => prepare(&config, &source, insights.clone())
            .and_then(|()| build(&config, insights, &output, true)),
        Commands::Validate { insights } => validate(&config, insights),
    };

    result.unwrap_or_else(|e| fail(&e))
}

fn prepare(config: &RunConfig, source: &Path, insights: Option<PathBuf>) -> Result<(), PipelineError> {
    let builder = ManifestBuilder::new(&config.work_dir);
    let manifest = builder.prepare(source)?;
    let handoff = Handoff::new(&config.work_dir, insights);
    let stale = handoff.retire_insights()?;
    emit(json!({
        "success": true,
        "manifest": builder.manifest_path(),
        "run_id": manifest.run_id,
        "total_slides": manifest.total_slides,
        "insights": handoff.insights_path(),
        "retired_insights": stale,
    }));
    Ok(())
}

fn build(
    config: &RunConfig,
    insights: Option<PathBuf>,
    output: &Path,
    wait: bool,
) -> Result<ExitCode, PipelineError> {
    let pipeline = BuildPipeline::from_config(config)?;
    let handoff = Handoff::new(&config.work_dir, insights);
    let manifest = handoff.manifest()?;

    let deck = if wait {
        handoff.wait_for_insights(&manifest, pipeline.schema(), config.poll_interval())
    } else {
        load_deck(handoff.insights_path())?
    };

    let (result, written) = pipeline.build_to(&deck, &manifest, output)?;
    let report = &result.report;
    if report.failure_mode != deckforge_core::FailureMode::Log {
        eprintln!("{}", report.compliance.render_text());
    }

    emit(json!({
        "success": !report.blocked,
        "output": written.document,
        "report_path": written.report,
        "report": report,
    }));

    Ok(if report.blocked { ExitCode::from(2) } else { ExitCode::SUCCESS })
}

fn validate(config: &RunConfig, insights: Option<PathBuf>) -> Result<ExitCode, PipelineError> {
    let pipeline = BuildPipeline::from_config(config)?;
    let handoff = Handoff::new(&config.work_dir, insights);
    let manifest = handoff.manifest()?;
    let deck = load_deck(handoff.insights_path())?;

    pipeline.validate(&deck, &manifest)?;
    emit(json!({
        "valid": true,
        "records": deck.slides.len(),
        "pages": manifest.total_slides,
    }));
    Ok(ExitCode::SUCCESS)
}
