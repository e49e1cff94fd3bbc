//! Fan-out to every detection provider and merge their verdicts.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future;
use thiserror::Error;
use tracing::{debug, warn};

use redraft_common::{AggregateResult, ProviderResult};

use crate::traits::DetectionProvider;

/// A sentence is flagged when its mean score across providers is strictly
/// above this threshold. A mean of exactly 50 is not flagged.
const FLAG_THRESHOLD: f64 = 50.0;

#[derive(Debug, Error)]
pub enum AggregateError {
    /// Every registered provider failed for this evaluation. Distinct
    /// outcome so callers never see a mean over zero providers.
    #[error("no detection provider produced a result")]
    AllProvidersFailed,
}

pub struct Aggregator {
    providers: Vec<Arc<dyn DetectionProvider>>,
}

impl Aggregator {
    pub fn new(providers: Vec<Arc<dyn DetectionProvider>>) -> Self {
        Self { providers }
    }

    /// Score `text` with every provider concurrently and merge.
    ///
    /// Providers are fail-soft: a `Failed` result is excluded from the
    /// merge. Segment scores are grouped by exact text equality, and the
    /// merged order follows first appearance across providers in
    /// registration order.
    pub async fn evaluate(&self, text: &str) -> Result<AggregateResult, AggregateError> {
        let results =
            future::join_all(self.providers.iter().map(|p| p.evaluate(text))).await;

        let mut providers = Vec::new();
        let mut overall_scores = Vec::new();
        let mut segment_order: Vec<String> = Vec::new();
        let mut segment_scores: HashMap<String, Vec<f64>> = HashMap::new();

        for result in results {
            match result {
                ProviderResult::Success {
                    provider,
                    overall,
                    segments,
                } => {
                    debug!(provider = provider.as_str(), overall, "provider result");
                    providers.push(provider);
                    overall_scores.push(overall);
                    for segment in segments {
                        if !segment_scores.contains_key(&segment.text) {
                            segment_order.push(segment.text.clone());
                        }
                        segment_scores
                            .entry(segment.text)
                            .or_default()
                            .push(segment.score);
                    }
                }
                ProviderResult::Failed { provider } => {
                    warn!(
                        provider = provider.as_str(),
                        "provider failed, excluding from aggregate"
                    );
                }
            }
        }

        if overall_scores.is_empty() {
            return Err(AggregateError::AllProvidersFailed);
        }

        let overall_score = overall_scores.iter().sum::<f64>() / overall_scores.len() as f64;

        let flagged_segments = segment_order
            .into_iter()
            .filter(|text| {
                let scores = &segment_scores[text];
                let mean = scores.iter().sum::<f64>() / scores.len() as f64;
                mean > FLAG_THRESHOLD
            })
            .collect();

        Ok(AggregateResult {
            overall_score,
            flagged_segments,
            providers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDetector;
    use redraft_common::SegmentScore;

    #[tokio::test]
    async fn all_failed_providers_yield_explicit_no_data_outcome() {
        let aggregator = Aggregator::new(vec![
            Arc::new(MockDetector::failing("alpha")),
            Arc::new(MockDetector::failing("beta")),
        ]);

        let result = aggregator.evaluate("some text").await;
        assert!(matches!(result, Err(AggregateError::AllProvidersFailed)));
    }

    #[tokio::test]
    async fn mean_of_exactly_fifty_is_not_flagged() {
        let aggregator = Aggregator::new(vec![
            Arc::new(MockDetector::fixed(
                "alpha",
                80.0,
                vec![SegmentScore::new("The suspect sentence.", 80.0)],
            )),
            Arc::new(MockDetector::fixed(
                "beta",
                20.0,
                vec![SegmentScore::new("The suspect sentence.", 20.0)],
            )),
        ]);

        let result = aggregator.evaluate("The suspect sentence.").await.unwrap();

        assert_eq!(result.overall_score, 50.0);
        assert!(result.flagged_segments.is_empty());
        assert_eq!(result.providers, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn mean_above_fifty_is_flagged_in_first_seen_order() {
        let aggregator = Aggregator::new(vec![
            Arc::new(MockDetector::fixed(
                "alpha",
                90.0,
                vec![
                    SegmentScore::new("First sentence.", 100.0),
                    SegmentScore::new("Second sentence.", 100.0),
                ],
            )),
            Arc::new(MockDetector::fixed(
                "beta",
                40.0,
                vec![
                    SegmentScore::new("Second sentence.", 20.0),
                    SegmentScore::new("First sentence.", 80.0),
                ],
            )),
        ]);

        let result = aggregator.evaluate("whatever").await.unwrap();

        assert_eq!(result.overall_score, 65.0);
        // First: mean 90 → flagged. Second: mean 60 → flagged. Order is
        // first-seen, not score order.
        assert_eq!(
            result.flagged_segments,
            vec!["First sentence.", "Second sentence."]
        );
    }

    #[tokio::test]
    async fn partial_provider_failure_degrades_but_does_not_abort() {
        let aggregator = Aggregator::new(vec![
            Arc::new(MockDetector::failing("alpha")),
            Arc::new(MockDetector::fixed(
                "beta",
                70.0,
                vec![SegmentScore::new("Only sentence.", 70.0)],
            )),
        ]);

        let result = aggregator.evaluate("Only sentence.").await.unwrap();

        assert_eq!(result.overall_score, 70.0);
        assert_eq!(result.providers, vec!["beta"]);
        assert_eq!(result.flagged_segments, vec!["Only sentence."]);
    }
}
