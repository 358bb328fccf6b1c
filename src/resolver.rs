use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::domain::{
    AssetDescriptor, DuplicatePolicy, Manifest, SourceRef, SourceSelection, WritePolicy,
    validate_asset_name,
};
use crate::error::ExportError;
use crate::mirror::{MirrorClient, check_registry};
use crate::optimize::{Optimizer, inner_markup};
use crate::primary::{PrimaryClient, extract_components, parse_export_urls};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::queue::FailurePolicy;
use crate::stager::ASSET_DIR;

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions<'a> {
    pub canvas: &'a str,
    pub document_url: &'a str,
    pub duplicates: DuplicatePolicy,
}

#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub manifest: Manifest,
    pub plan: Vec<AssetDescriptor>,
    pub write_policy: WritePolicy,
    pub failure_policy: FailurePolicy,
}

pub struct SourceResolver<P, M, O> {
    primary: P,
    mirror: M,
    optimizer: O,
}

impl<P: PrimaryClient, M: MirrorClient, O: Optimizer> SourceResolver<P, M, O> {
    pub fn new(primary: P, mirror: M, optimizer: O) -> Self {
        Self {
            primary,
            mirror,
            optimizer,
        }
    }

    pub fn resolve(
        &self,
        selection: &SourceSelection,
        options: ResolveOptions<'_>,
        sink: &dyn ProgressSink,
    ) -> Result<ResolvedSource, ExportError> {
        match selection {
            SourceSelection::Primary { file_key, .. } => {
                sink.event(ProgressEvent::phase(
                    "Resolve",
                    format!("reading document {file_key}"),
                ));
                let document = self.primary.fetch_document(file_key)?;
                let components = extract_components(&document, options.canvas)?;
                info!(
                    canvas = options.canvas,
                    components = components.len(),
                    "resolve.primary"
                );
                let mut manifest = build_manifest(components, options.duplicates)?;

                let ids: Vec<String> = manifest
                    .descriptors()
                    .map(|descriptor| descriptor.external_id.clone())
                    .collect();
                if !ids.is_empty() {
                    sink.event(ProgressEvent::phase(
                        "Resolve",
                        format!("requesting {} export URLs", ids.len()),
                    ));
                    let response = self.primary.fetch_export_urls(file_key, &ids)?;
                    let urls = parse_export_urls(&response, &ids)?;
                    attach_export_urls(&mut manifest, urls);
                }

                Ok(ResolvedSource {
                    plan: manifest.descriptors().cloned().collect(),
                    manifest,
                    write_policy: selection.write_policy(),
                    failure_policy: FailurePolicy::FailFast,
                })
            }
            SourceSelection::Mirror {
                base_url,
                local_version,
            } => {
                sink.event(ProgressEvent::phase(
                    "Resolve",
                    format!("checking mirror {base_url}"),
                ));
                let entry = self.mirror.fetch_registry(base_url)?;
                check_registry(&entry, local_version, options.document_url)?;

                let published = self.mirror.fetch_manifest(base_url)?;
                info!(
                    version = %entry.version,
                    assets = published.len(),
                    "resolve.mirror"
                );
                let mut manifest =
                    build_manifest(published.into_descriptors(), options.duplicates)?;
                for descriptor in manifest.descriptors_mut() {
                    descriptor.source_ref =
                        SourceRef::MirrorPath(format!("{ASSET_DIR}/{}", descriptor.file_name()));
                }

                Ok(ResolvedSource {
                    plan: manifest.descriptors().cloned().collect(),
                    manifest,
                    write_policy: selection.write_policy(),
                    failure_policy: FailurePolicy::FailFast,
                })
            }
        }
    }

    pub fn fetch(
        &self,
        selection: &SourceSelection,
        descriptor: &AssetDescriptor,
    ) -> Result<(AssetDescriptor, Vec<u8>), ExportError> {
        let mut descriptor = descriptor.clone();
        match (&descriptor.source_ref, selection) {
            (SourceRef::ExportUrl(url), SourceSelection::Primary { .. }) => {
                let raw = self.primary.download_markup(url)?;
                let optimized = self.optimizer.optimize(&descriptor.name, &raw)?;
                descriptor.content = Some(inner_markup(&descriptor.name, &optimized)?);
                debug!(name = %descriptor.name, "fetch.primary");
                Ok((descriptor, optimized.into_bytes()))
            }
            (SourceRef::MirrorPath(path), SourceSelection::Mirror { base_url, .. }) => {
                let bytes = self.mirror.fetch_asset(base_url, path)?;
                debug!(name = %descriptor.name, "fetch.mirror");
                Ok((descriptor, bytes))
            }
            (source_ref, _) => Err(ExportError::Config(format!(
                "asset {} has source {source_ref:?} that does not belong to the {} source",
                descriptor.name,
                selection.label()
            ))),
        }
    }
}

fn build_manifest(
    descriptors: impl IntoIterator<Item = AssetDescriptor>,
    duplicates: DuplicatePolicy,
) -> Result<Manifest, ExportError> {
    let mut manifest = Manifest::new();
    for descriptor in descriptors {
        validate_asset_name(&descriptor.name)?;
        let name = descriptor.name.clone();
        if manifest.insert(descriptor).is_some() {
            match duplicates {
                DuplicatePolicy::Fail => return Err(ExportError::DuplicateAsset(name)),
                DuplicatePolicy::Overwrite => {
                    warn!(%name, "resolve.duplicate_name")
                }
            }
        }
    }
    Ok(manifest)
}

fn attach_export_urls(manifest: &mut Manifest, urls: Vec<(String, String)>) {
    let by_id: HashMap<String, String> = urls.into_iter().collect();
    for descriptor in manifest.descriptors_mut() {
        if let Some(url) = by_id.get(&descriptor.external_id) {
            descriptor.source_ref = SourceRef::ExportUrl(url.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn descriptor(name: &str, id: &str) -> AssetDescriptor {
        AssetDescriptor {
            name: name.to_string(),
            external_id: id.to_string(),
            keywords: Vec::new(),
            width: 16.0,
            height: 16.0,
            content: None,
            source_ref: SourceRef::Unresolved,
        }
    }

    #[test]
    fn duplicate_names_keep_last_by_default() {
        let manifest = build_manifest(
            vec![descriptor("a", "1"), descriptor("a", "2")],
            DuplicatePolicy::Overwrite,
        )
        .unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.get("a").unwrap().external_id, "2");
    }

    #[test]
    fn duplicate_names_can_fail_fast() {
        let result = build_manifest(
            vec![descriptor("a", "1"), descriptor("a", "2")],
            DuplicatePolicy::Fail,
        );
        assert_matches!(result, Err(ExportError::DuplicateAsset(name)) if name == "a");
    }

    #[test]
    fn path_like_names_are_rejected() {
        let result = build_manifest(vec![descriptor("../x", "1")], DuplicatePolicy::Overwrite);
        assert_matches!(result, Err(ExportError::InvalidAssetName(_)));
    }
}
