use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::{DetectorError, Result};
use crate::{DetectedSegment, Detection};

const ORIGINALITY_API_URL: &str =
    "https://api.originality.ai/api/v2-tools/free-tools/ai-scan";

/// Client for the Originality free AI-scan endpoint.
///
/// Originality scores each block with a continuous `fake` fraction in
/// [0, 1]; scores are mapped to [0, 100] and the overall score is the mean
/// over non-empty blocks.
pub struct OriginalityClient {
    http: reqwest::Client,
}

impl OriginalityClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn detect(&self, text: &str) -> Result<Detection> {
        debug!(chars = text.len(), "Originality detect request");

        let resp = self
            .http
            .post(ORIGINALITY_API_URL)
            .header("Referer", "https://corefreetools.originality.ai")
            .header("Origin", "https://corefreetools.originality.ai")
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DetectorError::RateLimited);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DetectorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ScanResponse = serde_json::from_str(&resp.text().await?)?;
        Ok(body.into_detection())
    }
}

#[derive(Debug, Deserialize)]
struct ScanResponse {
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct Block {
    text: String,
    result: Option<BlockResult>,
}

#[derive(Debug, Deserialize)]
struct BlockResult {
    #[serde(default)]
    fake: f64,
}

impl ScanResponse {
    fn into_detection(self) -> Detection {
        let mut segments = Vec::with_capacity(self.blocks.len());
        let mut total = 0.0;

        for block in self.blocks {
            let text = block.text.trim();
            if text.is_empty() {
                continue;
            }

            let score = block.result.map(|r| r.fake).unwrap_or(0.0) * 100.0;
            total += score;
            segments.push(DetectedSegment {
                text: text.to_string(),
                score,
            });
        }

        let overall = if segments.is_empty() {
            0.0
        } else {
            total / segments.len() as f64
        };

        Detection { overall, segments }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_fake_fractions_to_percentages() {
        let raw = r#"{
            "blocks": [
                {"text": "First sentence.", "result": {"fake": 0.9}},
                {"text": "Second sentence.", "result": {"fake": 0.1}}
            ]
        }"#;

        let body: ScanResponse = serde_json::from_str(raw).unwrap();
        let detection = body.into_detection();

        assert_eq!(detection.segments[0].score, 90.0);
        assert_eq!(detection.segments[1].score, 10.0);
        assert_eq!(detection.overall, 50.0);
    }

    #[test]
    fn skips_empty_blocks_and_handles_no_blocks() {
        let raw = r#"{"blocks": [{"text": "   ", "result": {"fake": 1.0}}]}"#;
        let body: ScanResponse = serde_json::from_str(raw).unwrap();
        let detection = body.into_detection();

        assert!(detection.segments.is_empty());
        assert_eq!(detection.overall, 0.0);
    }

    #[test]
    fn missing_result_scores_zero() {
        let raw = r#"{"blocks": [{"text": "A sentence.", "result": null}]}"#;
        let body: ScanResponse = serde_json::from_str(raw).unwrap();
        let detection = body.into_detection();

        assert_eq!(detection.segments[0].score, 0.0);
    }
}
