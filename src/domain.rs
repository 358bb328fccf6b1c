use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ExportError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceRef {
    #[default]
    Unresolved,
    ExportUrl(String),
    MirrorPath(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "id")]
    pub external_id: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub width: f64,
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "path")]
    pub content: Option<String>,
    #[serde(skip)]
    pub source_ref: SourceRef,
}

impl AssetDescriptor {
    pub fn file_name(&self) -> String {
        format!("{}.svg", self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(BTreeMap<String, AssetDescriptor>);

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, descriptor: AssetDescriptor) -> Option<AssetDescriptor> {
        self.0.insert(descriptor.name.clone(), descriptor)
    }

    pub fn get(&self, name: &str) -> Option<&AssetDescriptor> {
        self.0.get(name)
    }

    /// Callers must not change `name` through the returned references.
    pub fn descriptors_mut(&mut self) -> impl Iterator<Item = &mut AssetDescriptor> {
        self.0.values_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &AssetDescriptor> {
        self.0.values()
    }

    pub fn into_descriptors(self) -> impl Iterator<Item = AssetDescriptor> {
        self.0.into_values()
    }
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub descriptor: AssetDescriptor,
    pub content: Vec<u8>,
    pub path: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelection {
    Primary {
        token: String,
        domain: String,
        file_key: FileKey,
    },
    Mirror {
        base_url: String,
        local_version: String,
    },
}

impl SourceSelection {
    pub fn write_policy(&self) -> WritePolicy {
        match self {
            SourceSelection::Primary { .. } => WritePolicy::ClearBeforeWrite,
            SourceSelection::Mirror { .. } => WritePolicy::WriteInPlace,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SourceSelection::Primary { .. } => "primary",
            SourceSelection::Mirror { .. } => "mirror",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    ClearBeforeWrite,
    WriteInPlace,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Overwrite,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileKey(String);

impl FileKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_url(url: &str) -> Option<Self> {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN.get_or_init(|| {
            Regex::new(r"/(?:file|design|proto)/([A-Za-z0-9]+)").expect("valid file key regex")
        });
        pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|key| Self(key.as_str().to_string()))
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileKey {
    type Err = ExportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(ExportError::Config(format!("invalid file key: {value:?}")));
        }
        Ok(Self(trimmed.to_string()))
    }
}

pub fn parse_keywords(description: &str) -> Vec<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r"(?i)keywords:[ \t]*([^\r\n]*)").expect("valid keywords regex"));
    let Some(caps) = pattern.captures(description) else {
        return Vec::new();
    };
    caps[1]
        .split(',')
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn validate_asset_name(name: &str) -> Result<(), ExportError> {
    let invalid = name.trim().is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name == ".."
        || name.contains('\0');
    if invalid {
        return Err(ExportError::InvalidAssetName(name.to_string()));
    }
    Ok(())
}
