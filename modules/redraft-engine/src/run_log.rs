//! Persisted JSON timeline of one run.
//!
//! Each run produces a single `{DATA_DIR}/redraft-runs/{run_id}.json` file
//! containing an ordered list of events with timestamps.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use redraft_common::RoundLogEntry;
use serde::Serialize;
use tracing::info;

/// Root data directory, controlled by `DATA_DIR` env var (default: `"data"`).
pub fn data_dir() -> PathBuf {
    PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()))
}

pub struct RunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: EventKind,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    InitialEvaluation {
        score: f64,
        flagged: usize,
        providers: Vec<String>,
    },
    RoundStarted {
        round: u32,
        flagged: usize,
    },
    CandidateScored {
        round: u32,
        candidate: usize,
        score: f64,
        flagged: usize,
    },
    RoundAccepted {
        round: u32,
        score: f64,
        flagged: usize,
    },
    RoundRolledBack {
        round: u32,
        candidate_score: f64,
        best_score: f64,
        consecutive_rollbacks: u32,
    },
    Terminated {
        reason: String,
        final_score: f64,
        final_round: u32,
    },
}

impl RunLog {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    /// Serialize the run log to JSON and write to disk.
    /// Returns the file path on success.
    pub fn save(&self, rounds: &[RoundLogEntry]) -> Result<PathBuf> {
        let dir = data_dir().join("redraft-runs");
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.json", self.run_id));

        let output = SerializedRunLog {
            run_id: &self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            rounds,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Run log saved");

        Ok(path)
    }
}

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    run_id: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    rounds: &'a [RoundLogEntry],
    events: &'a [RunEvent],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_sequenced_in_order() {
        let mut log = RunLog::new("test-run".to_string());
        log.log(EventKind::RoundStarted {
            round: 1,
            flagged: 3,
        });
        log.log(EventKind::RoundAccepted {
            round: 1,
            score: 42.0,
            flagged: 2,
        });

        assert_eq!(log.events.len(), 2);
        assert_eq!(log.events[0].seq, 0);
        assert_eq!(log.events[1].seq, 1);
    }

    #[test]
    fn serialized_events_carry_snake_case_type_tags() {
        let mut log = RunLog::new("test-run".to_string());
        log.log(EventKind::Terminated {
            reason: "cleared".to_string(),
            final_score: 10.0,
            final_round: 4,
        });

        let json = serde_json::to_value(&log.events).unwrap();
        assert_eq!(json[0]["type"], "terminated");
        assert_eq!(json[0]["final_round"], 4);
    }
}
