// Test doubles for the two capability traits.
//
// - MockDetector (DetectionProvider) — rule-based text→verdict matching
// - QueueRewriter (RewriteModel) — pops scripted rewrites in call order

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use redraft_common::{ProviderResult, SegmentScore};

use crate::traits::{DetectionProvider, RewriteModel};

// ---------------------------------------------------------------------------
// MockDetector
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Verdict {
    overall: f64,
    segments: Vec<SegmentScore>,
}

struct Rule {
    marker: String,
    verdict: Verdict,
}

/// Rule-based detector. The first rule whose marker is contained in the
/// evaluated text wins; unmatched text reports `Failed`, so a mock with no
/// rules and no default is an always-failing provider.
pub struct MockDetector {
    name: String,
    rules: Vec<Rule>,
    default: Option<Verdict>,
    calls: AtomicUsize,
}

impl MockDetector {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: Vec::new(),
            default: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider that fails every evaluation.
    pub fn failing(name: &str) -> Self {
        Self::new(name)
    }

    /// A provider that returns the same verdict for any text.
    pub fn fixed(name: &str, overall: f64, segments: Vec<SegmentScore>) -> Self {
        let mut detector = Self::new(name);
        detector.default = Some(Verdict { overall, segments });
        detector
    }

    /// Script a verdict for any text containing `marker`. The listed
    /// sentences are reported at score 100 so the aggregate flags them.
    pub fn when_contains(mut self, marker: &str, overall: f64, flagged: &[&str]) -> Self {
        self.rules.push(Rule {
            marker: marker.to_string(),
            verdict: Verdict {
                overall,
                segments: flagged
                    .iter()
                    .map(|text| SegmentScore::new(*text, 100.0))
                    .collect(),
            },
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetectionProvider for MockDetector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, text: &str) -> ProviderResult {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let verdict = self
            .rules
            .iter()
            .find(|rule| text.contains(&rule.marker))
            .map(|rule| rule.verdict.clone())
            .or_else(|| self.default.clone());

        match verdict {
            Some(verdict) => ProviderResult::Success {
                provider: self.name.clone(),
                overall: verdict.overall,
                segments: verdict.segments,
            },
            None => ProviderResult::Failed {
                provider: self.name.clone(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// QueueRewriter
// ---------------------------------------------------------------------------

/// Pops scripted rewrites in call order; errors once the script runs dry.
pub struct QueueRewriter {
    queue: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl QueueRewriter {
    pub fn new(rewrites: Vec<String>) -> Self {
        Self {
            queue: Mutex::new(rewrites.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RewriteModel for QueueRewriter {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.queue.lock().unwrap().pop_front() {
            Some(rewrite) => Ok(rewrite),
            None => bail!("rewrite script exhausted"),
        }
    }
}
