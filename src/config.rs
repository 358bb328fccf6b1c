use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{DuplicatePolicy, FileKey, SourceSelection};
use crate::error::ExportError;
use crate::http::HttpSettings;
use crate::mirror::DEFAULT_MIRROR_URL;
use crate::primary::{DEFAULT_CANVAS, DEFAULT_DOMAIN};
use crate::queue::DEFAULT_CONCURRENCY;

pub const DEFAULT_CONFIG_FILE: &str = "icon-export.json";
pub const DEFAULT_OUTPUT_DIR: &str = "dist";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub url: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub canvas: Option<String>,
    #[serde(default)]
    pub mirror_url: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    #[serde(default)]
    pub retries: Option<usize>,
    #[serde(default)]
    pub duplicates: Option<DuplicatePolicy>,
}

#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub output: Option<String>,
    pub concurrency: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub deadline_secs: Option<u64>,
    pub retries: Option<usize>,
    pub fail_on_duplicate: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub selection: SourceSelection,
    pub document_url: String,
    pub canvas: String,
    pub output: Utf8PathBuf,
    pub concurrency: usize,
    pub http: HttpSettings,
    pub deadline: Option<Duration>,
    pub duplicates: DuplicatePolicy,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: Option<&str>) -> Result<Config, ExportError> {
        let config_path = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        let content = fs::read_to_string(&config_path)
            .map_err(|_| ExportError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| ExportError::ConfigParse(err.to_string()))
    }

    pub fn resolve(config: Config, overrides: Overrides) -> Result<ResolvedConfig, ExportError> {
        Self::resolve_with(config, overrides, |key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(
        config: Config,
        overrides: Overrides,
        env: F,
    ) -> Result<ResolvedConfig, ExportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|value| !value.trim().is_empty());
        if config.url.trim().is_empty() {
            return Err(ExportError::Config("config field `url` is empty".to_string()));
        }

        let selection = match lookup("TOKEN") {
            Some(token) => {
                let domain = lookup("DOMAIN").unwrap_or_else(|| DEFAULT_DOMAIN.to_string());
                let file_key = match lookup("FILE_KEY") {
                    Some(key) => key.parse()?,
                    None => FileKey::from_url(&config.url)
                        .ok_or_else(|| ExportError::MissingFileKey(Some(config.url.clone())))?,
                };
                SourceSelection::Primary {
                    token,
                    domain,
                    file_key,
                }
            }
            None => {
                let local_version = config.version.clone().ok_or_else(|| {
                    ExportError::Config(
                        "TOKEN is unset and config has no `version` to check the mirror against"
                            .to_string(),
                    )
                })?;
                SourceSelection::Mirror {
                    base_url: config
                        .mirror_url
                        .clone()
                        .unwrap_or_else(|| DEFAULT_MIRROR_URL.to_string()),
                    local_version,
                }
            }
        };

        let concurrency = overrides
            .concurrency
            .or(config.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ExportError::Config("concurrency must be at least 1".to_string()));
        }

        let defaults = HttpSettings::default();
        let http = HttpSettings {
            timeout: overrides
                .request_timeout_secs
                .or(config.request_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            retries: overrides
                .retries
                .or(config.retries)
                .unwrap_or(defaults.retries),
        };

        let duplicates = if overrides.fail_on_duplicate {
            DuplicatePolicy::Fail
        } else {
            config.duplicates.unwrap_or_default()
        };

        Ok(ResolvedConfig {
            selection,
            document_url: config.url,
            canvas: config.canvas.unwrap_or_else(|| DEFAULT_CANVAS.to_string()),
            output: Utf8PathBuf::from(
                overrides
                    .output
                    .or(config.output)
                    .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            ),
            concurrency,
            http,
            deadline: overrides
                .deadline_secs
                .or(config.deadline_secs)
                .map(Duration::from_secs),
            duplicates,
        })
    }
}
