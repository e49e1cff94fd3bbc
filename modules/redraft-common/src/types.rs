use serde::{Deserialize, Serialize};

/// One detector's score for one sentence, score in [0, 100].
///
/// Sentences are identified by their exact string content, not by position.
/// Two distinct sentences with identical text are one entity to the whole
/// pipeline (history tracking, flagged sets, candidate reconstruction).
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentScore {
    pub text: String,
    pub score: f64,
}

impl SegmentScore {
    pub fn new(text: impl Into<String>, score: f64) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

/// Outcome of one detection provider evaluating one document.
///
/// Providers never error across this boundary: an unretriable failure
/// becomes `Failed` so the aggregator can exclude it without aborting the
/// other providers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResult {
    Success {
        provider: String,
        /// Whole-document score in [0, 100].
        overall: f64,
        segments: Vec<SegmentScore>,
    },
    Failed {
        provider: String,
    },
}

impl ProviderResult {
    /// Provider identifier, present on both success and failure.
    pub fn provider(&self) -> &str {
        match self {
            Self::Success { provider, .. } | Self::Failed { provider } => provider,
        }
    }
}

/// Merged view across all providers for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    /// Mean of successful providers' overall scores.
    pub overall_score: f64,
    /// Sentences whose mean score across providers is strictly above 50,
    /// in first-seen order.
    pub flagged_segments: Vec<String>,
    /// Providers that contributed, in registration order.
    pub providers: Vec<String>,
}

/// One recorded rewrite attempt for a sentence, appended never removed.
/// Keyed by the original sentence text in the search state.
#[derive(Debug, Clone, PartialEq)]
pub struct SentenceAttempt {
    pub round: u32,
    /// Overall score of the candidate this rewrite appeared in.
    pub score: f64,
    pub rewrite: String,
}

/// Append-only audit trail entry, one per completed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundLogEntry {
    pub round: u32,
    pub best_candidate_score: f64,
    pub accepted: bool,
}
