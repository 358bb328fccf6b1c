use std::collections::BTreeMap;

use serde::Deserialize;

use crate::domain::{AssetDescriptor, Manifest};
use crate::error::ExportError;
use crate::http::{HttpClient, HttpSettings, join_segments};

pub const DEFAULT_MIRROR_URL: &str = "https://unpkg.com/@icon-export/icons@latest";
pub const REGISTRY_PATH: &str = "registry.json";
pub const MANIFEST_PATH: &str = "icons.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryEntry {
    pub version: String,
    pub url: String,
}

pub trait MirrorClient: Send + Sync {
    fn fetch_registry(&self, base_url: &str) -> Result<RegistryEntry, ExportError>;
    fn fetch_manifest(&self, base_url: &str) -> Result<Manifest, ExportError>;
    fn fetch_asset(&self, base_url: &str, path: &str) -> Result<Vec<u8>, ExportError>;
}

#[derive(Clone)]
pub struct MirrorHttpClient {
    http: HttpClient,
}

impl MirrorHttpClient {
    pub fn new(settings: HttpSettings) -> Result<Self, ExportError> {
        Ok(Self {
            http: HttpClient::new("mirror", settings)?,
        })
    }
}

impl MirrorClient for MirrorHttpClient {
    fn fetch_registry(&self, base_url: &str) -> Result<RegistryEntry, ExportError> {
        let text = self.http.get_text(&join_segments(base_url, REGISTRY_PATH)?)?;
        parse_registry(&text)
    }

    fn fetch_manifest(&self, base_url: &str) -> Result<Manifest, ExportError> {
        let text = self.http.get_text(&join_segments(base_url, MANIFEST_PATH)?)?;
        parse_manifest(&text)
    }

    fn fetch_asset(&self, base_url: &str, path: &str) -> Result<Vec<u8>, ExportError> {
        self.http.get_bytes(&join_segments(base_url, path)?)
    }
}

pub fn parse_registry(text: &str) -> Result<RegistryEntry, ExportError> {
    serde_json::from_str(text).map_err(|err| ExportError::Http {
        stage: "mirror",
        message: format!("invalid registry entry: {err}"),
    })
}

pub fn parse_manifest(text: &str) -> Result<Manifest, ExportError> {
    let parsed: BTreeMap<String, AssetDescriptor> =
        serde_json::from_str(text).map_err(|err| ExportError::Http {
            stage: "mirror",
            message: format!("invalid manifest: {err}"),
        })?;
    let mut manifest = Manifest::new();
    for (key, mut descriptor) in parsed {
        if descriptor.name.is_empty() {
            descriptor.name = key;
        }
        manifest.insert(descriptor);
    }
    Ok(manifest)
}

/// Mirror trust gate: both the version tag and the document url must agree.
pub fn check_registry(
    entry: &RegistryEntry,
    local_version: &str,
    local_url: &str,
) -> Result<(), ExportError> {
    if entry.version.trim() != local_version.trim() {
        return Err(ExportError::SourceMismatch {
            field: "version",
            local: local_version.to_string(),
            remote: entry.version.clone(),
        });
    }
    if entry.url.trim() != local_url.trim() {
        return Err(ExportError::SourceMismatch {
            field: "url",
            local: local_url.to_string(),
            remote: entry.url.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const URL: &str = "https://www.figma.com/file/abc/Icons";

    #[test]
    fn matching_registry_passes() {
        let entry = RegistryEntry {
            version: "3".to_string(),
            url: URL.to_string(),
        };
        assert!(check_registry(&entry, "3", URL).is_ok());
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let entry = RegistryEntry {
            version: "4".to_string(),
            url: URL.to_string(),
        };
        assert_matches!(
            check_registry(&entry, "3", URL),
            Err(ExportError::SourceMismatch { field: "version", .. })
        );
    }

    #[test]
    fn url_mismatch_is_rejected() {
        let entry = RegistryEntry {
            version: "3".to_string(),
            url: "https://www.figma.com/file/other/Icons".to_string(),
        };
        assert_matches!(
            check_registry(&entry, "3", URL),
            Err(ExportError::SourceMismatch { field: "url", .. })
        );
    }

    #[test]
    fn asset_names_with_url_delimiters_stay_in_the_path() {
        let manifest = parse_manifest(
            r#"{"c#sharp":{"id":"1:1","width":16,"height":16},"why?":{"id":"1:2","width":16,"height":16}}"#,
        )
        .unwrap();
        let urls: Vec<String> = manifest
            .descriptors()
            .map(|descriptor| {
                join_segments("https://mirror.test/icons", &format!("svg/{}", descriptor.file_name()))
                    .unwrap()
            })
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://mirror.test/icons/svg/c%23sharp.svg",
                "https://mirror.test/icons/svg/why%3F.svg",
            ]
        );
    }

    #[test]
    fn manifest_names_default_to_keys() {
        let manifest = parse_manifest(r#"{"star":{"id":"9:9","width":16,"height":16}}"#).unwrap();
        assert_eq!(manifest.get("star").unwrap().name, "star");
    }
}
