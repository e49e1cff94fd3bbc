//! Capability traits for the two external services the loop drives.

use anyhow::Result;
use async_trait::async_trait;

use redraft_common::ProviderResult;

/// One AI-text detection service.
///
/// Implementations retry transient failures internally and never error past
/// this boundary: anything unrecoverable becomes `ProviderResult::Failed` so
/// the aggregator can exclude the provider without aborting the others.
#[async_trait]
pub trait DetectionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, text: &str) -> ProviderResult;
}

/// A language model that rewrites one sentence per call.
///
/// May fail after exhausting its own retry budget; the candidate generator
/// treats that as fatal for the whole round.
#[async_trait]
pub trait RewriteModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String>;
}
