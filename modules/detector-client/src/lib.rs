pub mod error;
pub mod originality;
pub mod zerogpt;

pub use error::{DetectorError, Result};
pub use originality::OriginalityClient;
pub use zerogpt::ZeroGptClient;

use std::time::Duration;

/// One sentence-level score from a detection service, score in [0, 100].
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedSegment {
    pub text: String,
    pub score: f64,
}

/// A detection service's verdict for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Whole-document score in [0, 100].
    pub overall: f64,
    pub segments: Vec<DetectedSegment>,
}

/// Both free-scan endpoints reject non-browser clients, so every request
/// goes out with a browser User-Agent.
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:146.0) Gecko/20100101 Firefox/146.0";

/// Build the HTTP client shared by all detection clients. Construct once
/// at startup and clone into each client (clones share the connection pool).
pub fn shared_http() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to build HTTP client")
}
