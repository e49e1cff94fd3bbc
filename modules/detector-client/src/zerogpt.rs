use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::{DetectorError, Result};
use crate::{DetectedSegment, Detection};

const ZEROGPT_API_URL: &str = "https://api.zerogpt.com/api/detect/detectText";

/// Client for the ZeroGPT free detection endpoint.
///
/// ZeroGPT marks sentences discretely: flagged sentences come back in `h`
/// (scored 100 here), the rest in `sentences` (scored 0).
pub struct ZeroGptClient {
    http: reqwest::Client,
}

impl ZeroGptClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn detect(&self, text: &str) -> Result<Detection> {
        debug!(chars = text.len(), "ZeroGPT detect request");

        let resp = self
            .http
            .post(ZEROGPT_API_URL)
            .header("Referer", "https://www.zerogpt.com/")
            .header("Origin", "https://www.zerogpt.com")
            .json(&serde_json::json!({ "input_text": text }))
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

        let body: DetectResponse = serde_json::from_str(&resp.text().await?)?;
        body.into_detection()
    }
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    data: Option<DetectData>,
}

#[derive(Debug, Deserialize)]
struct DetectData {
    #[serde(rename = "fakePercentage")]
    fake_percentage: f64,
    /// Sentences the service marked as AI-written.
    #[serde(default)]
    h: Vec<String>,
    /// Sentences the service considered human-written.
    #[serde(default)]
    sentences: Vec<String>,
}

impl DetectResponse {
    fn into_detection(self) -> Result<Detection> {
        let data = self
            .data
            .ok_or_else(|| DetectorError::Parse("response missing data field".to_string()))?;

        let mut segments = Vec::with_capacity(data.h.len() + data.sentences.len());
        for s in data.h {
            segments.push(DetectedSegment {
                text: s.trim().to_string(),
                score: 100.0,
            });
        }
        for s in data.sentences {
            segments.push(DetectedSegment {
                text: s.trim().to_string(),
                score: 0.0,
            });
        }

        Ok(Detection {
            overall: data.fake_percentage,
            segments,
        })
    }
}
