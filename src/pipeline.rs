use crate::config::AttachConfig;
use crate::domains::{host_of_base_url, DomainFilter};
use crate::download::{BatchBudget, BatchDownloader, DownloadOutcome, UrlCache};
use crate::fetch::RemoteFetcher;
use crate::rewrite::apply_outcome;
use crate::scan::scan_images;
use crate::store::{AttachTarget, AttachmentStore};
use crate::Result;
use std::path::{Path, PathBuf};

/// Result of one pass over a piece of content. `errors` are operator-facing
/// lines, one per non-success classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub content: String,
    pub attached_count: usize,
    pub errors: Vec<String>,
}

/// Orchestrates scan, download, and rewrite for one site. Persistence of
/// the rewritten content is the caller's job; attachments registered before
/// a caller-side failure stay registered.
pub struct AutoAttach<'a> {
    config: &'a AttachConfig,
    store: &'a dyn AttachmentStore,
    fetcher: &'a dyn RemoteFetcher,
    filter: DomainFilter,
    spool_dir: PathBuf,
}

impl<'a> AutoAttach<'a> {
    pub fn new(
        config: &'a AttachConfig,
        store: &'a dyn AttachmentStore,
        fetcher: &'a dyn RemoteFetcher,
        base_url: &str,
        request_host: Option<&str>,
        spool_dir: &Path,
    ) -> Self {
        let base_host = host_of_base_url(base_url);
        let filter = DomainFilter::new(
            &config.except_domains,
            base_host.as_deref(),
            request_host,
        );
        Self {
            config,
            store,
            fetcher,
            filter,
            spool_dir: spool_dir.to_path_buf(),
        }
    }

    pub fn run(
        &self,
        content: &str,
        target: &AttachTarget,
        cache: &mut UrlCache,
    ) -> Result<RunOutcome> {
        let refs = scan_images(content, &self.filter, self.config.retry_failed_downloads);
        if refs.is_empty() {
            return Ok(RunOutcome {
                content: content.to_string(),
                attached_count: 0,
                errors: Vec::new(),
            });
        }
        tracing::debug!(
            candidates = refs.len(),
            target_id = target.target_id,
            "processing external images"
        );

        let downloader =
            BatchDownloader::new(self.config, self.store, self.fetcher, &self.spool_dir);
        let budget = BatchBudget::new(
            self.config.per_item_timeout(),
            self.config.aggregate_timeout(),
        );
        let report = downloader.run(&refs, target, &budget, cache)?;

        let mut rewritten = content.to_string();
        let mut errors = Vec::new();
        for (image, outcome) in &report.outcomes {
            rewritten = apply_outcome(&rewritten, image, outcome);
            if let Some(reason) = failure_reason(outcome) {
                errors.push(format!(
                    "{reason}: {} (target {})",
                    image.url, target.target_id
                ));
            }
        }

        Ok(RunOutcome {
            content: rewritten,
            attached_count: report.success_count,
            errors,
        })
    }
}

fn failure_reason(outcome: &DownloadOutcome) -> Option<&'static str> {
    match outcome {
        DownloadOutcome::Success { .. } => None,
        DownloadOutcome::Timeout => Some("download timed out"),
        DownloadOutcome::Failure => Some("download failed"),
        DownloadOutcome::SizeLimitedSingle => Some("file exceeds the single upload limit"),
        DownloadOutcome::SizeLimitedTotal => Some("attachments exceed the total upload limit"),
        DownloadOutcome::AnimatedGif => Some("animated gif not allowed"),
        DownloadOutcome::InsertError => Some("attachment registration failed"),
    }
}
