//! Adaptive rewrite loop: score a document with multiple AI-text detectors,
//! rewrite the flagged sentences, and hill-climb with rollback until the
//! aggregate score clears the target.

pub mod aggregate;
pub mod candidates;
pub mod dispatch;
pub mod infra;
pub mod retry;
pub mod rounds;
pub mod run_log;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
