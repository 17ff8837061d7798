//! Environment configuration

use crate::core::state::ProgressPolicy;
use anyhow::{Context, anyhow};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_MODEL_ID: &str = "Hermes-3-Llama-3.2-3B-q4f16_1-MLC";
pub const DEFAULT_MODELS_DIR: &str = "models";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// `LLM_MODEL_ID`
    pub model_id: String,
    /// `LLM_MODELS_DIR`
    pub models_dir: PathBuf,
    /// `LLM_PROGRESS_POLICY`
    pub progress_policy: ProgressPolicy,
    /// `LISTEN_ADDR`
    pub listen_addr: SocketAddr,
}

impl EngineConfig {
    /// Reads the process environment, after loading `.env` if there is one.
    pub fn from_env() -> anyhow::Result<EngineConfig> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<EngineConfig> {
        let model_id = lookup("LLM_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_owned());
        if model_id.trim().is_empty() {
            return Err(anyhow!("LLM_MODEL_ID must not be empty"));
        }

        let models_dir = lookup("LLM_MODELS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_DIR));

        let progress_policy = match lookup("LLM_PROGRESS_POLICY") {
            Some(policy) => policy
                .parse::<ProgressPolicy>()
                .map_err(|e: String| anyhow!(e))
                .context("invalid LLM_PROGRESS_POLICY")?,
            None => ProgressPolicy::default(),
        };

        let listen_addr = lookup("LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned())
            .parse::<SocketAddr>()
            .context("invalid LISTEN_ADDR")?;

        Ok(EngineConfig {
            model_id,
            models_dir,
            progress_policy,
            listen_addr,
        })
    }
}
