use crate::config::AttachConfig;
use crate::fetch::RemoteFetcher;
use crate::scan::ImageRef;
use crate::sniff;
use crate::store::{AttachTarget, AttachmentStore, SizePolicy};
use crate::Result;
use percent_encoding::percent_decode_str;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

/// Resolved URL to stored filename, scoped to one editing session. At most
/// one network fetch happens per distinct URL while a cache is live.
#[derive(Debug, Default)]
pub struct UrlCache {
    entries: HashMap<String, String>,
}

impl UrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(String::as_str)
    }

    pub fn insert(&mut self, url: String, filename: String) {
        self.entries.insert(url, filename);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Time budgets for one batch. The aggregate clock starts when the budget
/// is created.
#[derive(Debug)]
pub struct BatchBudget {
    per_item: Duration,
    aggregate: Duration,
    started: Instant,
}

impl BatchBudget {
    pub fn new(per_item: Duration, aggregate: Duration) -> Self {
        Self {
            per_item,
            aggregate,
            started: Instant::now(),
        }
    }

    pub fn per_item(&self) -> Duration {
        self.per_item
    }

    pub fn aggregate_exceeded(&self) -> bool {
        self.started.elapsed() >= self.aggregate
    }
}

/// Terminal classification of one image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Success { filename: String, bytes: u64 },
    Timeout,
    Failure,
    SizeLimitedSingle,
    SizeLimitedTotal,
    AnimatedGif,
    InsertError,
}

impl DownloadOutcome {
    pub fn token(&self) -> &'static str {
        match self {
            DownloadOutcome::Success { .. } => "success",
            DownloadOutcome::Timeout => "download-timeout",
            DownloadOutcome::Failure => "download-failure",
            DownloadOutcome::SizeLimitedSingle => "size-limit-single",
            DownloadOutcome::SizeLimitedTotal => "size-limit-total",
            DownloadOutcome::AnimatedGif => "animated-gif",
            DownloadOutcome::InsertError => "insert-error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Success { .. })
    }
}

/// Classified references in production order. References skipped by the
/// aggregate budget are absent and keep their tags untouched.
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub success_count: usize,
    pub outcomes: Vec<(ImageRef, DownloadOutcome)>,
}

pub struct BatchDownloader<'a> {
    config: &'a AttachConfig,
    store: &'a dyn AttachmentStore,
    fetcher: &'a dyn RemoteFetcher,
    spool_dir: &'a Path,
}

impl<'a> BatchDownloader<'a> {
    pub fn new(
        config: &'a AttachConfig,
        store: &'a dyn AttachmentStore,
        fetcher: &'a dyn RemoteFetcher,
        spool_dir: &'a Path,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            spool_dir,
        }
    }

    pub fn run(
        &self,
        refs: &[ImageRef],
        target: &AttachTarget,
        budget: &BatchBudget,
        cache: &mut UrlCache,
    ) -> Result<DownloadReport> {
        let mut report = DownloadReport::default();
        if refs.is_empty() {
            return Ok(report);
        }
        std::fs::create_dir_all(self.spool_dir)?;

        let privileged = self.store.is_interactive_request()
            && self.store.is_privileged_actor(target.actor_id);
        let enforce_limits = self.config.apply_size_limits && !privileged;
        let policy = if enforce_limits {
            self.store.size_policy(target.module_id)?
        } else {
            SizePolicy::default()
        };

        let mut total_limited = false;
        for image in refs {
            if let Some(filename) = cache.get(&image.url) {
                tracing::debug!(url = %image.url, filename, "reusing stored attachment");
                report.success_count += 1;
                report.outcomes.push((
                    image.clone(),
                    DownloadOutcome::Success {
                        filename: filename.to_string(),
                        bytes: 0,
                    },
                ));
                continue;
            }

            if total_limited || budget.aggregate_exceeded() {
                // left unclassified; a later pass picks the tag up again
                continue;
            }

            let spool_path = self
                .spool_dir
                .join(format!("fetch-{}", uuid::Uuid::new_v4()));
            let classified = self.classify(
                image,
                target,
                budget,
                &policy,
                enforce_limits,
                &mut total_limited,
                cache,
                &spool_path,
            );
            let _ = std::fs::remove_file(&spool_path);
            let outcome = classified?;

            if outcome.is_success() {
                report.success_count += 1;
            }
            report.outcomes.push((image.clone(), outcome));
        }
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn classify(
        &self,
        image: &ImageRef,
        target: &AttachTarget,
        budget: &BatchBudget,
        policy: &SizePolicy,
        enforce_limits: bool,
        total_limited: &mut bool,
        cache: &mut UrlCache,
        spool_path: &Path,
    ) -> Result<DownloadOutcome> {
        let started = Instant::now();
        let fetched = self
            .fetcher
            .fetch_to_file(&image.url, spool_path, budget.per_item());
        let elapsed = started.elapsed();

        let bytes = match fetched {
            Ok(bytes) if bytes > 0 => bytes,
            Ok(_) => {
                tracing::warn!(url = %image.url, "empty download body");
                return Ok(timeout_or_failure(elapsed, budget.per_item()));
            }
            Err(e) => {
                tracing::warn!(url = %image.url, error = %e, "download failed");
                return Ok(timeout_or_failure(elapsed, budget.per_item()));
            }
        };

        if enforce_limits {
            if policy.single_exceeded(bytes) {
                tracing::warn!(url = %image.url, bytes, "file over the single upload limit");
                return Ok(DownloadOutcome::SizeLimitedSingle);
            }
            let attached = self.store.attached_total_size(target.target_id)?;
            if policy.total_exceeded(attached, bytes) {
                tracing::warn!(url = %image.url, attached, bytes, "target over the total upload limit");
                *total_limited = true;
                return Ok(DownloadOutcome::SizeLimitedTotal);
            }
        }

        if !self.config.allow_animated_gif && sniff::is_animated_gif(spool_path) {
            tracing::debug!(url = %image.url, "rejecting animated gif");
            return Ok(DownloadOutcome::AnimatedGif);
        }

        let suggested = suggest_filename(&image.url, spool_path, &self.config.default_extension);
        match self
            .store
            .register_attachment(spool_path, &suggested, target)
        {
            Ok(stored) => {
                cache.insert(image.url.clone(), stored.filename.clone());
                Ok(DownloadOutcome::Success {
                    filename: stored.filename,
                    bytes,
                })
            }
            Err(e) => {
                tracing::warn!(url = %image.url, error = %e, "attachment registration failed");
                Ok(DownloadOutcome::InsertError)
            }
        }
    }
}

fn timeout_or_failure(elapsed: Duration, per_item: Duration) -> DownloadOutcome {
    if elapsed >= per_item {
        DownloadOutcome::Timeout
    } else {
        DownloadOutcome::Failure
    }
}

/// Recovers an upload name from the URL, falling back to a hash of the URL
/// plus a sniffed extension when no usable name is present.
fn suggest_filename(url: &str, spool_path: &Path, default_ext: &str) -> String {
    let decoded = percent_decode_str(url).decode_utf8_lossy();
    let name_re =
        Regex::new(r"(?i)[^\\/?=]+\.(gif|jpe?g|png|bmp|svg)\b").expect("filename regex");
    if let Some(m) = name_re.find(&decoded) {
        return m.as_str().to_string();
    }

    let mut header = [0u8; 16];
    let header_len = std::fs::File::open(spool_path)
        .and_then(|mut f| f.read(&mut header))
        .unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!(
        "{}.{}",
        &digest[..32],
        sniff::guess_extension(&header[..header_len], default_ext)
    )
}
