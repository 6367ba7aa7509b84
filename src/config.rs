use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    pub llm: LlmConfig,
    pub chunker: ChunkerConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize)]
pub struct DataConfig {
    /// Directory holding the vector index artifacts.
    pub dir: String,
    pub sqlite_path: String,
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
}

#[derive(Debug, Deserialize)]
pub struct ChunkerConfig {
    pub max_chars: usize,
    pub overlap: usize,
}

#[derive(Debug, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub overfetch: usize,
    pub fallback_sentences: usize,
    pub backend_timeout_secs: u64,
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DOCSIFT_DATA_DIR") {
            self.data.dir = v;
        }
        if let Ok(v) = std::env::var("DOCSIFT_SQLITE_PATH") {
            self.data.sqlite_path = v;
        }
        if let Ok(v) = std::env::var("DOCSIFT_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("DOCSIFT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("DOCSIFT_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
    }

    fn default() -> Self {
        Self {
            data: DataConfig {
                dir: "data".into(),
                sqlite_path: "data/docsift.db".into(),
            },
            llm: LlmConfig {
                base_url: "https://api.openai.com".into(),
                model: "gpt-4o-mini".into(),
                embedding_model: "text-embedding-3-small".into(),
            },
            chunker: ChunkerConfig {
                max_chars: 1000,
                overlap: 200,
            },
            retrieval: RetrievalConfig {
                top_k: 4,
                overfetch: 3,
                fallback_sentences: 5,
                backend_timeout_secs: 30,
            },
        }
    }
}
