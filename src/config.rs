//! Backend configuration (`vasm.toml`).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_page_size() -> usize {
    64 * 1024
}

/// Settings for code pages and logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JitConfig {
    /// Bytes requested per arena page (rounded up to host pages).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Preferred address for new mappings. Only a hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement_hint: Option<usize>,
    /// Log every page transition and write.
    #[serde(default)]
    pub trace: bool,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `vasm=debug`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            placement_hint: None,
            trace: false,
            log_filter: None,
        }
    }
}

impl JitConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        let config: JitConfig =
            toml::from_str(content).map_err(|e| format!("failed to parse config: {}", e))?;
        if config.page_size == 0 {
            return Err("page_size must be greater than zero".to_string());
        }
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("failed to serialize config: {}", e))?;
        fs::write(path, content).map_err(|e| format!("failed to write {}: {}", path.display(), e))
    }
}
