//! Production adapters wiring the HTTP clients to the capability traits.
//!
//! Each detection adapter retries internally and degrades to a soft
//! `Failed` result; the rewrite adapter retries internally and then
//! propagates, which fails the whole round.

use ai_client::{AiClientError, OpenAi};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use detector_client::{Detection, DetectorError, OriginalityClient, ZeroGptClient};
use redraft_common::{ProviderResult, SegmentScore};

use crate::retry::{self, CallError, RetryPolicy};
use crate::traits::{DetectionProvider, RewriteModel};

fn classify_detector(error: DetectorError) -> CallError {
    match error {
        DetectorError::RateLimited => CallError::RateLimited("status 429".to_string()),
        DetectorError::Network(message) => CallError::Transient(message),
        DetectorError::Api { status, message } => {
            CallError::Transient(format!("status {status}: {message}"))
        }
        DetectorError::Parse(message) => CallError::Malformed(message),
    }
}

fn success(provider: &str, detection: Detection) -> ProviderResult {
    ProviderResult::Success {
        provider: provider.to_string(),
        overall: detection.overall,
        segments: detection
            .segments
            .into_iter()
            .map(|s| SegmentScore::new(s.text, s.score))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Detection providers
// ---------------------------------------------------------------------------

pub struct ZeroGptProvider {
    client: ZeroGptClient,
    policy: RetryPolicy,
}

impl ZeroGptProvider {
    pub fn new(client: ZeroGptClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }
}

#[async_trait]
impl DetectionProvider for ZeroGptProvider {
    fn name(&self) -> &str {
        "zerogpt"
    }

    async fn evaluate(&self, text: &str) -> ProviderResult {
        let outcome = retry::execute(&self.policy, || async {
            self.client.detect(text).await.map_err(classify_detector)
        })
        .await;

        match outcome {
            Ok(detection) => success(self.name(), detection),
            Err(error) => {
                warn!(provider = self.name(), error = %error, "detection failed");
                ProviderResult::Failed {
                    provider: self.name().to_string(),
                }
            }
        }
    }
}

pub struct OriginalityProvider {
    client: OriginalityClient,
    policy: RetryPolicy,
}

impl OriginalityProvider {
    pub fn new(client: OriginalityClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }
}

#[async_trait]
impl DetectionProvider for OriginalityProvider {
    fn name(&self) -> &str {
        "originality"
    }

    async fn evaluate(&self, text: &str) -> ProviderResult {
        let outcome = retry::execute(&self.policy, || async {
            self.client.detect(text).await.map_err(classify_detector)
        })
        .await;

        match outcome {
            Ok(detection) => success(self.name(), detection),
            Err(error) => {
                warn!(provider = self.name(), error = %error, "detection failed");
                ProviderResult::Failed {
                    provider: self.name().to_string(),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rewrite model
// ---------------------------------------------------------------------------

fn classify_rewrite(error: AiClientError) -> CallError {
    if error.is_rate_limited() {
        return CallError::RateLimited(error.to_string());
    }
    match error {
        AiClientError::Network(message) => CallError::Transient(message),
        AiClientError::Api { status, message } => {
            CallError::Transient(format!("status {status}: {message}"))
        }
        AiClientError::Parse(message) => CallError::Malformed(message),
        AiClientError::EmptyResponse => CallError::Malformed(error.to_string()),
    }
}

pub struct OpenAiRewriter {
    client: OpenAi,
    policy: RetryPolicy,
}

impl OpenAiRewriter {
    pub fn new(client: OpenAi, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }
}

#[async_trait]
impl RewriteModel for OpenAiRewriter {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        retry::execute(&self.policy, || async {
            self.client
                .chat_completion(system_prompt, user_prompt, temperature, max_tokens)
                .await
                .map_err(classify_rewrite)
        })
        .await
        .context("rewrite call failed")
    }
}
