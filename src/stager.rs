use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::domain::{Manifest, WritePolicy};
use crate::error::ExportError;

pub const ASSET_DIR: &str = "svg";
pub const MANIFEST_FILE: &str = "icons.json";

#[derive(Debug, Clone)]
pub struct OutputStager {
    root: Utf8PathBuf,
}

impl OutputStager {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn asset_dir(&self) -> Utf8PathBuf {
        self.root.join(ASSET_DIR)
    }

    pub fn asset_path(&self, name: &str) -> Utf8PathBuf {
        self.asset_dir().join(format!("{name}.svg"))
    }

    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn prepare(&self, policy: WritePolicy) -> Result<(), ExportError> {
        if policy == WritePolicy::ClearBeforeWrite && self.root.as_std_path().exists() {
            info!(root = %self.root, "stage.clear");
            fs::remove_dir_all(self.root.as_std_path()).map_err(ExportError::fs)?;
        }
        fs::create_dir_all(self.root.as_std_path()).map_err(ExportError::fs)
    }

    pub fn write_asset(&self, name: &str, content: &[u8]) -> Result<Utf8PathBuf, ExportError> {
        let path = self.asset_path(name);
        write_atomic(&path, content)?;
        debug!(%path, bytes = content.len(), "stage.asset");
        Ok(path)
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<Utf8PathBuf, ExportError> {
        let path = self.manifest_path();
        let mut content = serde_json::to_vec_pretty(manifest).map_err(ExportError::fs)?;
        content.push(b'\n');
        write_atomic(&path, &content)?;
        info!(%path, entries = manifest.len(), "stage.manifest");
        Ok(path)
    }
}

fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), ExportError> {
    let parent = path
        .parent()
        .ok_or_else(|| ExportError::Filesystem(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent.as_std_path()).map_err(ExportError::fs)?;
    let mut temp = tempfile::Builder::new()
        .prefix(".icon-export")
        .tempfile_in(parent.as_std_path())
        .map_err(ExportError::fs)?;
    temp.write_all(content).map_err(ExportError::fs)?;
    temp.persist(path.as_std_path())
        .map_err(|err| ExportError::Filesystem(format!("persist {path}: {}", err.error)))?;
    Ok(())
}
