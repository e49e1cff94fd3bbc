use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use detector_client::{OriginalityClient, ZeroGptClient};
use redraft_common::Config;
use redraft_engine::aggregate::Aggregator;
use redraft_engine::candidates::{CandidateGenerator, GeneratorOptions};
use redraft_engine::infra::{OpenAiRewriter, OriginalityProvider, ZeroGptProvider};
use redraft_engine::retry::RetryPolicy;
use redraft_engine::rounds::{LoopOptions, RoundController};
use redraft_engine::run_log::RunLog;
use redraft_engine::traits::DetectionProvider;

/// Iteratively rewrite a document until its detection score clears the
/// target.
#[derive(Parser)]
#[command(name = "redraft")]
struct Args {
    /// Document to rewrite.
    #[arg(long, default_value = "essay.txt")]
    essay: PathBuf,

    /// Base instruction prompt for the rewrite model.
    #[arg(long, default_value = "prompt.txt")]
    prompt: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("redraft_engine=info".parse()?),
        )
        .init();

    info!("Redraft starting...");

    let args = Args::parse();
    let config = Config::from_env();
    config.log_redacted();

    let essay = fs::read_to_string(&args.essay)
        .with_context(|| format!("Failed to read {}", args.essay.display()))?;
    let base_prompt = fs::read_to_string(&args.prompt)
        .with_context(|| format!("Failed to read {}", args.prompt.display()))?;

    // All network clients are constructed once here and passed in; nothing
    // else owns connection state.
    let http = detector_client::shared_http();
    let providers: Vec<Arc<dyn DetectionProvider>> = vec![
        Arc::new(ZeroGptProvider::new(
            ZeroGptClient::new(http.clone()),
            RetryPolicy::default(),
        )),
        Arc::new(OriginalityProvider::new(
            OriginalityClient::new(http),
            RetryPolicy::default(),
        )),
    ];
    let aggregator = Aggregator::new(providers);

    let model =
        OpenAi::new(&config.api_key, &config.rewrite_model).with_base_url(&config.api_base_url);
    let rewriter = OpenAiRewriter::new(model, RetryPolicy::default());
    let generator = CandidateGenerator::new(
        Arc::new(rewriter),
        base_prompt,
        GeneratorOptions {
            candidates: config.candidates,
            ..Default::default()
        },
    );

    let controller = RoundController::new(
        aggregator,
        generator,
        LoopOptions {
            target_score: config.target_score,
            max_rollbacks: config.max_rollbacks,
        },
    );

    let mut run_log = RunLog::new(uuid::Uuid::new_v4().to_string());
    let result = controller.run(&essay, &mut run_log).await;

    // Persist the timeline on success and on fatal error alike.
    let rounds = match &result {
        Ok(outcome) => outcome.round_log.clone(),
        Err(_) => Vec::new(),
    };
    if let Err(error) = run_log.save(&rounds) {
        warn!(error = %error, "Failed to save run log");
    }

    let outcome = result?;

    println!("\nScore progression:");
    for entry in &outcome.round_log {
        let status = if entry.accepted {
            "accepted"
        } else {
            "rolled back"
        };
        println!(
            "  Round {}: {:.1}% - {}",
            entry.round, entry.best_candidate_score, status
        );
    }
    println!(
        "\nFinal score: {:.1}% (round {}, {})",
        outcome.final_score, outcome.final_round, outcome.reason
    );
    println!("\n{}", outcome.final_text);

    Ok(())
}
