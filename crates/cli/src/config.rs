use anyhow::Context;
use notedex_indexer::STATE_DIR_NAME;
use serde::Deserialize;
use std::path::Path;

/// Configuration read from `<root>/.notedex/config.toml`.
///
/// Every field has a default, so the file is optional. The API key itself
/// never lives in the file — only the name of the environment variable
/// holding it.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub provider: ProviderSettings,
    pub index: IndexSettings,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key_env: String,
    pub embedding_model: String,
    pub completion_model: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            completion_model: "gpt-4o-mini".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct IndexSettings {
    pub exclusion_prefix: Option<String>,
    pub requests_per_minute: u32,
    pub document_batch_size: usize,
    pub chunk_token_budget: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            exclusion_prefix: None,
            requests_per_minute: 20,
            document_batch_size: 50,
            chunk_token_budget: 7_500,
        }
    }
}

pub fn load(root: &Path) -> anyhow::Result<CliConfig> {
    let path = root.join(STATE_DIR_NAME).join("config.toml");
    match std::fs::read_to_string(&path) {
        Ok(raw) => toml::from_str(&raw)
            .with_context(|| format!("invalid configuration in {}", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(CliConfig::default()),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}
