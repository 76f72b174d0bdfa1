use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde_json::Value;

use crate::domain::Classification;
use crate::error::AirError;
use crate::fetch::AssetClient;
use crate::links::dedup_urls;
use crate::paths::{DEFAULT_DIR, PathResolver, target_file_name};
use crate::store::{DownloadRecord, Item, ItemMeta, MetadataDocument, MetadataStore};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Probe and resolve targets without fetching or touching the document.
    pub dry_run: bool,
    /// Skip URLs that already have a record in the item's `downloads`.
    pub skip_recorded: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub items: usize,
    pub downloads: Vec<DownloadRecord>,
    pub planned: Vec<PlannedDownload>,
    pub skipped: Vec<String>,
    pub failures: Vec<UrlFailure>,
    pub changed: bool,
    pub document_written: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedDownload {
    pub url: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UrlFailure {
    pub url: String,
    pub stage: FailureStage,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Directory,
    Probe,
    Download,
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Download { url: String, path: Utf8PathBuf },
    Saved { path: Utf8PathBuf, size_bytes: u64 },
    Planned { url: String, path: Utf8PathBuf },
    Skipped { url: String },
    Warning { message: String },
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: AssetClient> {
    client: C,
    resolver: PathResolver,
}

impl<C: AssetClient> App<C> {
    pub fn new(client: C, resolver: PathResolver) -> Self {
        Self { client, resolver }
    }

    /// Loads the document, processes every item and writes the document back
    /// only if at least one download was recorded.
    pub fn run(
        &mut self,
        document_path: &Utf8Path,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, AirError> {
        let mut document = MetadataStore::load(document_path)?;
        let mut summary = self.process(&mut document, options, sink);
        summary.document_written =
            MetadataStore::save_if_changed(document_path, &document, summary.changed)?;
        Ok(summary)
    }

    pub fn process(
        &mut self,
        document: &mut MetadataDocument,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        let total = document.items.len();
        for (index, item) in document.items.iter_mut().enumerate() {
            tracing::debug!(item = index + 1, total, "processing item");
            self.process_item(item, options, sink, &mut summary);
            summary.items += 1;
        }
        summary
    }

    fn process_item(
        &mut self,
        item: &mut Item,
        options: RunOptions,
        sink: &dyn ProgressSink,
        summary: &mut RunSummary,
    ) {
        let empty = ItemMeta::default();
        let meta = item.meta().unwrap_or(&empty);
        let (urls, invalid): (Vec<&Value>, Vec<&Value>) =
            meta.download_links().iter().partition(|link| link.is_string());
        let urls: Vec<&str> = urls.into_iter().filter_map(Value::as_str).collect();
        let links = dedup_urls(&urls);
        let classification = classify(meta, sink);

        for link in invalid {
            warn(sink, format!("filename probe failed: {link} -> not a URL string"));
            summary.failures.push(UrlFailure {
                url: link.to_string(),
                stage: FailureStage::Probe,
                reason: "download link is not a string".to_string(),
            });
        }

        let base = match self.resolver.resolve_base(classification.as_ref()) {
            Ok(dir) => dir,
            Err(err) => {
                warn(sink, format!("cannot use directory for item: {err}"));
                summary
                    .failures
                    .extend(links.into_iter().map(|url| UrlFailure {
                        url,
                        stage: FailureStage::Directory,
                        reason: err.to_string(),
                    }));
                return;
            }
        };

        for url in links {
            if options.skip_recorded && item.is_recorded(&url) {
                sink.event(ProgressEvent::Skipped { url: url.clone() });
                summary.skipped.push(url);
                continue;
            }

            let probed = match self.client.probe_filename(&url) {
                Ok(name) => name,
                Err(err) => {
                    warn(sink, format!("filename probe failed: {url} -> {err}"));
                    summary.failures.push(UrlFailure {
                        url,
                        stage: FailureStage::Probe,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let name = target_file_name(classification.as_ref(), &probed);
            let target = self.resolver.resolve_filename(&base, &name);

            if options.dry_run {
                sink.event(ProgressEvent::Planned {
                    url: url.clone(),
                    path: target.clone(),
                });
                summary.planned.push(PlannedDownload {
                    url,
                    path: target.into_string(),
                });
                continue;
            }

            sink.event(ProgressEvent::Download {
                url: url.clone(),
                path: target.clone(),
            });
            match self.client.download(&url, &target) {
                Ok(size_bytes) => {
                    let record = DownloadRecord {
                        url,
                        relative_path: target.to_string(),
                        size_bytes,
                    };
                    item.push_download(record.clone());
                    summary.downloads.push(record);
                    summary.changed = true;
                    sink.event(ProgressEvent::Saved {
                        path: target,
                        size_bytes,
                    });
                }
                Err(err) => {
                    warn(sink, format!("download failed: {url} -> {err}"));
                    summary.failures.push(UrlFailure {
                        url,
                        stage: FailureStage::Download,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }
}

/// A malformed identifier is reported and treated as unclassified.
fn classify(meta: &ItemMeta, sink: &dyn ProgressSink) -> Option<Classification> {
    match Classification::from_meta(meta) {
        Ok(classification) => classification,
        Err(_) => {
            let raw = meta.copied_message().unwrap_or_default();
            warn(
                sink,
                format!("invalid AIR URN, fallback to {DEFAULT_DIR}/: {raw:?}"),
            );
            None
        }
    }
}

fn warn(sink: &dyn ProgressSink, message: String) {
    tracing::debug!(%message, "warning");
    sink.event(ProgressEvent::Warning { message });
}
