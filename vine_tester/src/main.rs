use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vine_vision::{
    ClassificationOrchestrator, ClassifierConfig, ClassifierSnapshot, ClassifierState, HttpBackend, ImageAsset,
    Outcome,
};

mod frame_writer;

use frame_writer::PngFrameSurface;

/// Verify and classify one grape-leaf image, optionally saving every simulation frame.
#[derive(Debug, Parser)]
#[command(name = "vine_tester", version)]
struct Args {
    /// Image to classify.
    image: PathBuf,

    /// TOML configuration file. Falls back to $VINE_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to write one PNG per simulation step into.
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Verification endpoint; overrides config and environment.
    #[arg(long)]
    verify_url: Option<String>,

    /// Classification endpoint; overrides config and environment.
    #[arg(long)]
    classify_url: Option<String>,

    /// Per-step dwell in milliseconds.
    #[arg(long)]
    dwell_ms: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // --- 1. Logging ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vine_vision=info,vine_tester=info")))
        .init();

    // --- 2. Configuration ---
    let args = Args::parse();
    let mut config = ClassifierConfig::resolve(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(url) = args.verify_url {
        config.endpoints.verify_url = url;
    }
    if let Some(url) = args.classify_url {
        config.endpoints.classify_url = url;
    }
    if args.dwell_ms.is_some() {
        config.simulation.dwell_ms = args.dwell_ms;
    }
    config.validate()?;

    // --- 3. Orchestrator Initialization ---
    let image = ImageAsset::from_path(&args.image, &config.upload.accepted_mime_types)
        .with_context(|| format!("cannot submit {}", args.image.display()))?;
    let backend = HttpBackend::new(config.endpoints())?;
    let orchestrator = ClassificationOrchestrator::new(Arc::new(backend), config.sequencer_config());

    if let Some(dir) = &args.frames {
        let surface = PngFrameSurface::new(dir, config.simulation.canvas_width, config.simulation.canvas_height)
            .with_context(|| format!("cannot create frame directory {}", dir.display()))?;
        orchestrator.sequencer().attach_surface(Box::new(surface));
    }

    // --- 4. Run ---
    tracing::info!(
        image = %args.image.display(),
        verify_url = %config.endpoints.verify_url,
        classify_url = %config.endpoints.classify_url,
        "Submitting image"
    );
    let outcome = tokio::select! {
        outcome = orchestrator.submit(image) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; resetting");
            orchestrator.reset_all();
            Outcome::Superseded
        }
    };

    // --- 5. Report ---
    let snapshot = orchestrator.snapshot();
    print_report(&snapshot);

    match outcome {
        Outcome::Completed(ClassifierState::Failed) => anyhow::bail!("classification failed"),
        Outcome::Completed(_) => Ok(()),
        Outcome::Superseded => anyhow::bail!("run was cancelled"),
    }
}

fn print_report(snapshot: &ClassifierSnapshot) {
    println!("State: {:?}", snapshot.state);
    if let Some(verification) = &snapshot.verification {
        println!(
            "Verification: grape leaf = {}, probability = {:.1}%, {}",
            verification.is_grape_leaf,
            verification.grape_probability * 100.0,
            verification.message
        );
    }
    if let Some(result) = &snapshot.classification {
        println!(
            "Diagnosis: {} {} ({:.1}% confidence)",
            result.info.emoji,
            result.predicted_class(),
            result.confidence * 100.0
        );
        println!("  Severity: {}", result.info.severity.label());
        println!("  {}", result.info.description);
        println!("  Treatment: {}", result.info.treatment);
        let remote = &result.remote_info;
        if !remote.description.is_empty() || !remote.treatment.is_empty() {
            println!("  Service says: {} (severity: {})", remote.description, remote.severity);
            println!("  Service treatment: {}", remote.treatment);
        }

        let mut predictions: Vec<_> = result.all_predictions.iter().collect();
        predictions.sort_by(|a, b| b.1.total_cmp(a.1));
        for (label, probability) in predictions {
            println!("  {label:<24} {:>5.1}%", probability * 100.0);
        }
    }
    if let Some(failure) = &snapshot.failure {
        println!("Error: {failure}");
    }
}
