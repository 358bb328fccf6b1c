use std::time::Instant;

use serde::Serialize;
use tracing::{error, info};

use crate::config::ResolvedConfig;
use crate::domain::{FetchResult, WritePolicy};
use crate::error::ExportError;
use crate::mirror::MirrorClient;
use crate::optimize::Optimizer;
use crate::primary::PrimaryClient;
use crate::progress::{ProgressEvent, ProgressSink, ProgressTracker};
use crate::queue::{Task, TaskQueue};
use crate::resolver::{ResolveOptions, SourceResolver};
use crate::stager::OutputStager;

#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub source: String,
    pub write_policy: WritePolicy,
    pub output: String,
    pub manifest_path: String,
    pub assets: Vec<ExportedAsset>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedAsset {
    pub name: String,
    pub path: String,
    pub bytes: usize,
}

pub struct App<P, M, O> {
    resolver: SourceResolver<P, M, O>,
}

impl<P: PrimaryClient, M: MirrorClient, O: Optimizer> App<P, M, O> {
    pub fn new(primary: P, mirror: M, optimizer: O) -> Self {
        Self {
            resolver: SourceResolver::new(primary, mirror, optimizer),
        }
    }

    pub fn export(
        &self,
        config: &ResolvedConfig,
        sink: &dyn ProgressSink,
    ) -> Result<ExportResult, ExportError> {
        let started = Instant::now();
        let selection = &config.selection;
        info!(source = selection.label(), output = %config.output, "export.start");

        let resolved = self.resolver.resolve(
            selection,
            ResolveOptions {
                canvas: &config.canvas,
                document_url: &config.document_url,
                duplicates: config.duplicates,
            },
            sink,
        )?;

        if let Some(deadline) = config.deadline
            && started.elapsed() >= deadline
        {
            error!(?deadline, "export.deadline_exceeded");
            return Err(ExportError::DeadlineExceeded(deadline));
        }

        let stager = OutputStager::new(config.output.clone());
        stager.prepare(resolved.write_policy)?;

        let tracker = ProgressTracker::new(resolved.plan.len());
        let mut queue = TaskQueue::new(config.concurrency);
        if let Some(deadline) = config.deadline {
            queue = queue.with_deadline_from(started, deadline);
        }
        sink.event(ProgressEvent::phase(
            "Download",
            format!(
                "{} assets, {} at a time",
                tracker.total(),
                queue.concurrency()
            ),
        ));

        let resolver = &self.resolver;
        let writer = &stager;
        let tasks: Vec<Task<'_, FetchResult>> = resolved
            .plan
            .iter()
            .map(|descriptor| {
                Box::new(move || -> Result<FetchResult, ExportError> {
                    let (descriptor, content) = resolver.fetch(selection, descriptor)?;
                    let path = writer.write_asset(&descriptor.name, &content)?;
                    Ok(FetchResult {
                        descriptor,
                        content,
                        path,
                    })
                }) as Task<'_, FetchResult>
            })
            .collect();

        let report = queue
            .run(tasks, resolved.failure_policy, |settlement| {
                tracker.complete_one();
                let message = match settlement.outcome {
                    Ok(result) => format!("{} {}", tracker.render(), result.descriptor.name),
                    Err(err) => format!("{} failed: {err}", tracker.render()),
                };
                sink.event(ProgressEvent {
                    message,
                    elapsed: Some(started.elapsed()),
                });
            })
            .inspect_err(|err| error!(error = %err, "export.failed"))?;

        if let Some((_, err)) = report.failures.into_iter().next() {
            return Err(err);
        }

        let mut manifest = resolved.manifest;
        let mut assets = Vec::with_capacity(report.succeeded.len());
        for (_, result) in report.succeeded {
            assets.push(ExportedAsset {
                name: result.descriptor.name.clone(),
                path: result.path.to_string(),
                bytes: result.content.len(),
            });
            manifest.insert(result.descriptor);
        }
        assets.sort_by(|a, b| a.name.cmp(&b.name));

        sink.event(ProgressEvent::phase("Store", "writing manifest"));
        let manifest_path = stager.write_manifest(&manifest)?;
        info!(assets = assets.len(), "export.done");

        Ok(ExportResult {
            source: selection.label().to_string(),
            write_policy: resolved.write_policy,
            output: stager.root().to_string(),
            manifest_path: manifest_path.to_string(),
            assets,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }
}
