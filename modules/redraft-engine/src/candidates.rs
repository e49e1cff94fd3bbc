//! Candidate rewrites for one round.
//!
//! Each candidate rewrites every flagged sentence once, with prompt context
//! assembled from the round history so the model stops repeating mutations
//! that already failed.

use std::sync::Arc;
use std::time::Duration;

use ai_client::util::truncate_to_char_boundary;
use anyhow::{Context, Result};
use rand::Rng;
use tracing::{debug, info};

use crate::dispatch::{self, BatchOptions};
use crate::rounds::SearchState;
use crate::traits::RewriteModel;

/// Max bytes of document context embedded in each rewrite prompt.
const PROMPT_DOC_BUDGET: usize = 30_000;

/// Temperature added to both range bounds per consecutive rollback.
const ROLLBACK_TEMP_BOOST: f32 = 0.2;

/// Rewrite aggressiveness, selected by the current score bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyTier {
    Aggressive,
    Moderate,
    Subtle,
}

impl StrategyTier {
    pub fn for_score(score: f64) -> Self {
        if score > 80.0 {
            Self::Aggressive
        } else if score > 50.0 {
            Self::Moderate
        } else {
            Self::Subtle
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            Self::Aggressive => {
                "Try completely different phrasing, sentence structure, and vocabulary."
            }
            Self::Moderate => "Make substantial changes while keeping the core meaning.",
            Self::Subtle => "Make subtle stylistic adjustments to reduce AI patterns.",
        }
    }

    /// Temperature range for this tier. Both bounds shift up per
    /// consecutive rollback so repeated failure provokes larger mutations.
    pub fn temperature_range(self, consecutive_rollbacks: u32) -> (f32, f32) {
        let (lo, hi) = match self {
            Self::Aggressive => (1.2, 1.5),
            Self::Moderate => (1.0, 1.3),
            Self::Subtle => (0.9, 1.1),
        };
        let boost = ROLLBACK_TEMP_BOOST * consecutive_rollbacks as f32;
        (lo + boost, hi + boost)
    }
}

/// One whole-document candidate with its sentence rewrites in replacement
/// order.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub text: String,
    pub rewrites: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Candidates generated per round.
    pub candidates: usize,
    /// Batch shape for the per-sentence rewrite calls.
    pub rewrite_batch: BatchOptions,
    /// Breathing room between candidates.
    pub candidate_pacing: Duration,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            candidates: 7,
            rewrite_batch: BatchOptions {
                batch_size: 40,
                pacing_delay: Duration::from_secs(2),
            },
            candidate_pacing: Duration::from_secs(2),
        }
    }
}

/// Immutable per-call request, snapshotted before dispatch. Nothing is
/// captured from loop variables after construction.
#[derive(Debug, Clone)]
struct RewriteRequest {
    sentence: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
    user_prompt: String,
}

pub struct CandidateGenerator {
    rewriter: Arc<dyn RewriteModel>,
    base_prompt: String,
    options: GeneratorOptions,
}

impl CandidateGenerator {
    pub fn new(
        rewriter: Arc<dyn RewriteModel>,
        base_prompt: impl Into<String>,
        options: GeneratorOptions,
    ) -> Self {
        Self {
            rewriter,
            base_prompt: base_prompt.into(),
            options,
        }
    }

    /// Generate the round's candidates sequentially, dispatching each
    /// candidate's sentence rewrites as one batched fan-out.
    ///
    /// A rewrite call that exhausts its retry budget fails the whole round
    /// via the dispatcher's fail-fast rule.
    pub async fn generate(&self, state: &SearchState) -> Result<Vec<Candidate>> {
        let flagged = &state.current_flagged;
        let tier = StrategyTier::for_score(state.current_score);
        let temp_range = tier.temperature_range(state.consecutive_rollbacks);
        let max_tokens = output_token_budget(&state.current_text);
        let score_context = score_context(state);

        info!(
            flagged = flagged.len(),
            strategy = ?tier,
            temp_min = temp_range.0,
            temp_max = temp_range.1,
            "generating candidates"
        );

        let mut candidates = Vec::with_capacity(self.options.candidates);
        for candidate_num in 0..self.options.candidates {
            debug!(
                candidate = candidate_num + 1,
                total = self.options.candidates,
                "generating candidate"
            );

            let requests: Vec<RewriteRequest> = flagged
                .iter()
                .map(|sentence| {
                    self.build_request(sentence, state, tier, temp_range, &score_context, max_tokens)
                })
                .collect();

            let calls: Vec<_> = requests
                .iter()
                .map(|request| {
                    let rewriter = Arc::clone(&self.rewriter);
                    async move {
                        rewriter
                            .complete(
                                &request.system_prompt,
                                &request.user_prompt,
                                request.temperature,
                                request.max_tokens,
                            )
                            .await
                    }
                })
                .collect();

            let rewrites = dispatch::run_batched(calls, &self.options.rewrite_batch)
                .await
                .with_context(|| format!("candidate {} rewrites failed", candidate_num + 1))?;

            let mut text = state.current_text.clone();
            let mut applied = Vec::with_capacity(requests.len());
            for (request, rewrite) in requests.iter().zip(rewrites) {
                let rewrite = rewrite.trim().to_string();
                // First occurrence only: if the same literal sentence
                // appears twice, the earlier one is rewritten even when the
                // later one was flagged.
                text = text.replacen(request.sentence.as_str(), &rewrite, 1);
                applied.push((request.sentence.clone(), rewrite));
            }
            candidates.push(Candidate {
                text,
                rewrites: applied,
            });

            if candidate_num + 1 < self.options.candidates {
                tokio::time::sleep(self.options.candidate_pacing).await;
            }
        }

        Ok(candidates)
    }

    fn build_request(
        &self,
        sentence: &str,
        state: &SearchState,
        tier: StrategyTier,
        (temp_min, temp_max): (f32, f32),
        score_context: &str,
        max_tokens: u32,
    ) -> RewriteRequest {
        let temperature = rand::rng().random_range(temp_min..=temp_max);
        let history_context = sentence_history_context(state, sentence);
        let failure_context = state.failure_narrative.as_deref().unwrap_or_default();

        let system_prompt = format!(
            "{base}\n\n\
             CURRENT TASK:\n\
             Rewrite this flagged sentence. Detection score: {score:.1}%\n\n\
             DETECTED ISSUES:\n\
             - AI-typical patterns in phrasing\n\
             - Predictable word choices for this formality level\n\
             - Mechanically perfect grammar\n\n\
             YOUR GOAL:\n\
             Rewrite to match a human writing, not an AI mimicking its tone.\n\
             Keep the formality EXACTLY the same, but make the execution less robotic.\n\
             {score_context}\n\
             {history_context}\n\
             {failure_context}\n\n\
             STRATEGY: {strategy}\n\n\
             Output ONLY the rewritten sentence.",
            base = self.base_prompt,
            score = state.current_score,
            strategy = tier.instruction(),
        );

        let document = truncate_to_char_boundary(&state.current_text, PROMPT_DOC_BUDGET);
        let user_prompt = format!("Full text:\n{document}\n\nRewrite:\n{sentence}");

        RewriteRequest {
            sentence: sentence.to_string(),
            temperature,
            max_tokens,
            system_prompt,
            user_prompt,
        }
    }
}

/// Rolling window over the last five rounds plus the best so far, shared by
/// every request in the round.
fn score_context(state: &SearchState) -> String {
    if state.round_log.is_empty() {
        return String::new();
    }

    let mut out = String::from("\nOVERALL SCORE HISTORY:\n");
    let window = &state.round_log[state.round_log.len().saturating_sub(5)..];
    for entry in window {
        let status = if entry.accepted {
            "ACCEPTED"
        } else {
            "ROLLED BACK"
        };
        out.push_str(&format!(
            "  Round {}: {:.1}% - {}\n",
            entry.round, entry.best_candidate_score, status
        ));
    }
    out.push_str(&format!(
        "Current best: {:.1}% (Round {})",
        state.best_score, state.best_round
    ));
    out
}

/// The last three recorded rewrites of this exact sentence, all of which
/// were still flagged afterwards.
fn sentence_history_context(state: &SearchState, sentence: &str) -> String {
    let attempts = match state.sentence_history.get(sentence) {
        Some(attempts) if !attempts.is_empty() => attempts,
        _ => return String::new(),
    };

    let mut out = String::from("\nPREVIOUS REWRITES OF THIS SENTENCE (all flagged as AI):\n");
    for attempt in &attempts[attempts.len().saturating_sub(3)..] {
        out.push_str(&format!(
            "  Attempt {} ({:.1}% AI): {}\n",
            attempt.round, attempt.score, attempt.rewrite
        ));
    }
    out.push_str("\nThese patterns didn't work. Try a completely different approach.");
    out
}

/// Output budget for one rewritten sentence: the document's word count with
/// 30% headroom plus a little slack.
fn output_token_budget(text: &str) -> u32 {
    (text.split_whitespace().count() as f64 * 1.3 + 20.0) as u32
}
