use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the OpenAI-compatible rewrite gateway.
    pub api_key: String,
    /// Base URL of the rewrite gateway.
    pub api_base_url: String,
    /// Model name passed to the rewrite gateway.
    pub rewrite_model: String,

    /// Stop once the aggregate score is at or below this value.
    pub target_score: f64,
    /// Stop after this many consecutive rolled-back rounds.
    pub max_rollbacks: u32,
    /// Candidate rewrites generated per round.
    pub candidates: usize,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            api_key: required_env("API_KEY"),
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| "https://api.mapleai.de/v1".to_string()),
            rewrite_model: env::var("REWRITE_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            target_score: env::var("TARGET_SCORE")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("TARGET_SCORE must be a number"),
            max_rollbacks: env::var("MAX_ROLLBACKS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("MAX_ROLLBACKS must be a number"),
            candidates: env::var("CANDIDATES")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .expect("CANDIDATES must be a number"),
        }
    }

    /// Log the loaded configuration without leaking the API key.
    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            let n = val.len().min(5);
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  API_KEY: {}", preview(&self.api_key));
        tracing::info!("  API_BASE_URL: {}", self.api_base_url);
        tracing::info!("  REWRITE_MODEL: {}", self.rewrite_model);
        tracing::info!("  TARGET_SCORE: {}", self.target_score);
        tracing::info!("  MAX_ROLLBACKS: {}", self.max_rollbacks);
        tracing::info!("  CANDIDATES: {}", self.candidates);
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
