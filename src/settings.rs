//! Optional YAML settings file.
//!
//! Everything has a default, so the file may be missing or partial:
//!
//! ```yaml
//! origin: https://digest.example.com
//! data_dir: /var/lib/awful_news_digest
//! timeout_secs: 120
//! summarizer:
//!   backend: http
//!   endpoint: https://digest.example.com/api/summarize
//! ```
//!
//! Command-line flags override values read from here.

use crate::api::LlmSummarizer;
use crate::webhook::DEFAULT_ORIGIN;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, instrument};

/// Data directory used when neither the CLI nor the settings name one.
pub const DEFAULT_DATA_DIR: &str = "./digest_data";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Origin the automation URLs point at.
    pub origin: String,
    /// Where digests and the webhook secret are stored.
    pub data_dir: PathBuf,
    /// Caller-imposed limit on one preview generation.
    pub timeout_secs: Option<u64>,
    pub summarizer: SummarizerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            timeout_secs: None,
            summarizer: SummarizerSettings::default(),
        }
    }
}

/// Which summarization service generates previews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum SummarizerSettings {
    /// An OpenAI-compatible LLM configured through `awful_aj`.
    Llm {
        #[serde(default = "default_template")]
        template: String,
        #[serde(default)]
        config_path: Option<String>,
    },
    /// A remote endpoint accepting the digest JSON.
    Http { endpoint: String },
}

fn default_template() -> String {
    LlmSummarizer::DEFAULT_TEMPLATE.to_string()
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        SummarizerSettings::Llm {
            template: default_template(),
            config_path: None,
        }
    }
}

impl Settings {
    /// Read settings from `path`.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Settings, SettingsError> {
        let raw = fs::read_to_string(path)
            .await
            .map_err(|source| SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let settings = Settings::parse(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?settings, "Loaded settings");
        Ok(settings)
    }

    /// Parse settings from YAML text. Empty text yields the defaults.
    pub fn parse(raw: &str) -> Result<Settings, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_settings_are_defaults() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
        assert_eq!(Settings::parse("  \n").unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_settings_keep_defaults() {
        let settings = Settings::parse("origin: https://digest.example.com\n").unwrap();
        assert_eq!(settings.origin, "https://digest.example.com");
        assert_eq!(settings.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(settings.timeout_secs, None);
        assert_eq!(
            settings.summarizer,
            SummarizerSettings::Llm {
                template: "news_digest".to_string(),
                config_path: None
            }
        );
    }

    #[test]
    fn test_http_backend() {
        let yaml = r#"
timeout_secs: 90
summarizer:
  backend: http
  endpoint: https://digest.example.com/api/summarize
"#;
        let settings = Settings::parse(yaml).unwrap();
        assert_eq!(settings.timeout_secs, Some(90));
        assert_eq!(
            settings.summarizer,
            SummarizerSettings::Http {
                endpoint: "https://digest.example.com/api/summarize".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(Settings::parse("summarizer:\n  backend: carrier-pigeon\n").is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("missing.yaml")).await.unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "data_dir: /tmp/digests\n").unwrap();
        let settings = Settings::load(&path).await.unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/digests"));
    }
}
