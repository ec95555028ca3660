use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use autoattach::download::UrlCache;
use autoattach::fetch::RemoteFetcher;
use autoattach::pipeline::AutoAttach;
use autoattach::store::{AttachTarget, AttachmentStore, SizePolicy, StoredAttachment};
use autoattach::{AttachError, Result};
use scraper::{Html, Selector};

const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 9, 9, 9, 9];

struct MapFetcher {
    responses: HashMap<String, Vec<u8>>,
    calls: RefCell<Vec<String>>,
}

impl MapFetcher {
    fn new(responses: &[(&str, &[u8])]) -> Self {
        Self {
            responses: responses
                .iter()
                .map(|(u, b)| (u.to_string(), b.to_vec()))
                .collect(),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl RemoteFetcher for MapFetcher {
    fn fetch_to_file(&self, url: &str, destination: &Path, _timeout: Duration) -> Result<u64> {
        self.calls.borrow_mut().push(url.to_string());
        match self.responses.get(url) {
            Some(bytes) => {
                std::fs::write(destination, bytes)?;
                Ok(bytes.len() as u64)
            }
            None => Err(AttachError::FetchStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

#[derive(Default)]
struct MemStore {
    registered: RefCell<Vec<(String, u64)>>,
}

impl AttachmentStore for MemStore {
    fn register_attachment(
        &self,
        path: &Path,
        suggested_name: &str,
        _target: &AttachTarget,
    ) -> Result<StoredAttachment> {
        let size = std::fs::metadata(path)?.len();
        let seq = self.registered.borrow().len() + 1;
        self.registered
            .borrow_mut()
            .push((suggested_name.to_string(), size));
        Ok(StoredAttachment {
            filename: format!("/files/attach/{seq}/{suggested_name}"),
        })
    }

    fn attached_total_size(&self, _target_id: u64) -> Result<u64> {
        Ok(self.registered.borrow().iter().map(|(_, s)| s).sum())
    }

    fn size_policy(&self, _module_id: u64) -> Result<SizePolicy> {
        Ok(SizePolicy::default())
    }

    fn is_privileged_actor(&self, _actor_id: u64) -> bool {
        false
    }

    fn is_interactive_request(&self) -> bool {
        true
    }
}

fn target() -> AttachTarget {
    AttachTarget {
        module_id: 3,
        target_id: 42,
        actor_id: 9,
    }
}

fn count_marked(html: &str, token: &str) -> usize {
    let doc = Html::parse_fragment(html);
    let selector =
        Selector::parse(&format!(r#"img[data-autoattach="{token}"]"#)).expect("img selector");
    doc.select(&selector).count()
}

#[test]
fn full_pass_rewrites_downloads_and_reports() {
    let good = "https://pics.example.net/photos/cat.png";
    let gone = "https://pics.example.net/photos/gone.png";
    let content = format!(
        concat!(
            "<p>intro</p>",
            r#"<img src="/files/local.png">"#,
            r#"<img src="{good}" alt="cat">"#,
            r#"<img src="{good}" alt="cat">"#,
            r#"<img src="{gone}">"#,
            r#"<img src="https://cdn.excluded.org/skip.png">"#,
        ),
        good = good,
        gone = gone,
    );

    let mut config = autoattach::config::AttachConfig::default();
    config.except_domains = "cdn.excluded.org".to_string();
    let store = MemStore::default();
    let fetcher = MapFetcher::new(&[(good, PNG_BYTES)]);
    let spool = tempfile::tempdir().expect("spool dir");

    let attach = AutoAttach::new(
        &config,
        &store,
        &fetcher,
        "https://board.example.com/",
        Some("board.example.com"),
        spool.path(),
    );

    let mut cache = UrlCache::new();
    let outcome = attach.run(&content, &target(), &mut cache).expect("run");

    // one fetch for the duplicated url, one for the missing one
    assert_eq!(fetcher.calls.borrow().len(), 2);
    assert_eq!(outcome.attached_count, 2);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].contains(gone));
    assert!(outcome.errors[0].contains("target 42"));

    assert_eq!(count_marked(&outcome.content, "success"), 2);
    assert_eq!(count_marked(&outcome.content, "download-failure"), 1);
    assert!(outcome.content.contains(r#"src="/files/attach/1/cat.png""#));
    assert!(outcome.content.contains(r#"src="/files/local.png""#));
    assert!(outcome
        .content
        .contains(r#"src="https://cdn.excluded.org/skip.png""#));
    assert!(outcome.content.contains(gone), "failed url must survive");

    let registered = store.registered.borrow();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].0, "cat.png");
}

#[test]
fn second_pass_is_inert_until_retry_is_requested() {
    let flaky = "https://pics.example.net/flaky.png";
    let content = format!(r#"<img src="{flaky}">"#);

    let config = autoattach::config::AttachConfig::default();
    let store = MemStore::default();
    let empty = MapFetcher::new(&[]);
    let spool = tempfile::tempdir().expect("spool dir");

    let attach = AutoAttach::new(
        &config,
        &store,
        &empty,
        "https://board.example.com/",
        None,
        spool.path(),
    );
    let mut cache = UrlCache::new();
    let first = attach.run(&content, &target(), &mut cache).expect("run");
    assert_eq!(count_marked(&first.content, "download-failure"), 1);

    // without retry the annotated tag is left alone
    let second = attach
        .run(&first.content, &target(), &mut cache)
        .expect("run");
    assert_eq!(second.content, first.content);
    assert_eq!(second.attached_count, 0);
    assert!(second.errors.is_empty());

    // with retry enabled and the remote back up, the tag converts
    let mut retry_config = autoattach::config::AttachConfig::default();
    retry_config.retry_failed_downloads = true;
    let recovered = MapFetcher::new(&[(flaky, PNG_BYTES)]);
    let retry_attach = AutoAttach::new(
        &retry_config,
        &store,
        &recovered,
        "https://board.example.com/",
        None,
        spool.path(),
    );
    let third = retry_attach
        .run(&first.content, &target(), &mut cache)
        .expect("run");
    assert_eq!(count_marked(&third.content, "success"), 1);
    assert_eq!(count_marked(&third.content, "download-failure"), 0);
    assert_eq!(third.attached_count, 1);

    // once successful, a further retry pass has nothing to do
    let fourth = retry_attach
        .run(&third.content, &target(), &mut cache)
        .expect("run");
    assert_eq!(fourth.content, third.content);
    assert_eq!(fourth.attached_count, 0);
}

#[test]
fn cache_spans_runs_within_one_editing_scope() {
    let url = "https://pics.example.net/shared.png";
    let config = autoattach::config::AttachConfig::default();
    let store = MemStore::default();
    let fetcher = MapFetcher::new(&[(url, PNG_BYTES)]);
    let spool = tempfile::tempdir().expect("spool dir");

    let attach = AutoAttach::new(
        &config,
        &store,
        &fetcher,
        "https://board.example.com/",
        None,
        spool.path(),
    );

    let mut cache = UrlCache::new();
    let first = attach
        .run(&format!(r#"<img src="{url}">"#), &target(), &mut cache)
        .expect("run");
    let second = attach
        .run(&format!(r#"<p>again</p><img src="{url}">"#), &target(), &mut cache)
        .expect("run");

    assert_eq!(fetcher.calls.borrow().len(), 1);
    assert_eq!(first.attached_count, 1);
    assert_eq!(second.attached_count, 1);
    assert_eq!(count_marked(&second.content, "success"), 1);
    assert_eq!(store.registered.borrow().len(), 1);
}
