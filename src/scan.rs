use crate::domains::DomainFilter;
use regex::Regex;

/// One external image reference as it appears in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// The whole `<img ...>` tag, byte for byte.
    pub full_match: String,
    /// The `src` value as written, quotes stripped, entities intact.
    pub raw_url_text: String,
    /// Entity-decoded URL used for fetching and dedup.
    pub url: String,
}

pub const TRANSIENT_TOKENS: [&str; 2] = ["download-failure", "download-timeout"];

/// Collects download candidates from the markup. Tags already carrying a
/// status marker are skipped unless `retry_failed` is set and the marker is
/// one of the transient tokens. Local URLs never become candidates.
pub fn scan_images(content: &str, filter: &DomainFilter, retry_failed: bool) -> Vec<ImageRef> {
    let tag_re = Regex::new(
        r#"(?i)<img\s[^>]*?src=('[^']+'|"[^"]+"|[^'"\r\n\t >]+)[^>]*?>"#,
    )
    .expect("img tag regex");
    let marker_re =
        Regex::new(r#"data-autoattach="([^"]+?)""#).expect("status marker regex");

    let mut refs = Vec::new();
    for caps in tag_re.captures_iter(content) {
        let Some(full) = caps.get(0) else { continue };
        let Some(raw) = caps.get(1) else { continue };

        if let Some(marker) = marker_re.captures(full.as_str()) {
            let token = marker.get(1).map(|m| m.as_str()).unwrap_or("");
            if !(retry_failed && TRANSIENT_TOKENS.contains(&token)) {
                continue;
            }
        }

        let raw_url_text = raw.as_str().trim_matches(|c| c == '\'' || c == '"');
        let url = html_escape::decode_html_entities(raw_url_text).into_owned();
        if filter.is_local(&url) {
            continue;
        }

        refs.push(ImageRef {
            full_match: full.as_str().to_string(),
            raw_url_text: raw_url_text.to_string(),
            url,
        });
    }
    refs
}
