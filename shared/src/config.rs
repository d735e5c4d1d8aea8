//! Configuration management for the tutoring workspace.

use std::env;
use std::time::Duration;

use crate::{Error, Result};

const DEFAULT_MODEL_ID: &str = "amazon.nova-pro-v1:0";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// AWS region
    pub aws_region: String,
    /// Bedrock model used for tutoring turns
    pub model_id: String,
    /// Bedrock model used for document analysis
    pub analysis_model_id: String,
    /// Completion token budget per turn
    pub max_tokens: i32,
    /// How long a transient notice stays visible
    pub notice_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            aws_region: "us-east-1".to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            analysis_model_id: DEFAULT_MODEL_ID.to_string(),
            max_tokens: 2048,
            notice_ttl: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let model_id = env::var("TUTOR_MODEL_ID").unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());

        Ok(Self {
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            analysis_model_id: env::var("ANALYSIS_MODEL_ID").unwrap_or_else(|_| model_id.clone()),
            model_id,
            max_tokens: parse_var("TUTOR_MAX_TOKENS", env::var("TUTOR_MAX_TOKENS").ok(), 2048)?,
            notice_ttl: Duration::from_secs(parse_var(
                "NOTICE_TTL_SECS",
                env::var("NOTICE_TTL_SECS").ok(),
                5,
            )?),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} must be a number, got {:?}", name, raw))),
        None => Ok(default),
    }
}
