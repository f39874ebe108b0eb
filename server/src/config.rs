use anyhow::{Context, Result};

use crate::model::{DEFAULT_BASE_URL, DEFAULT_MODEL};

const DEFAULT_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub addr: String,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.is_empty())
            .context("GEMINI_API_KEY must be set to call the generative model")?;

        Ok(Self {
            addr: lookup("PROSODY_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            api_key,
            model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: lookup("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}
