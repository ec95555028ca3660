use regex::Regex;
use url::Url;

/// Host component of the site's canonical base URL, if it has one.
pub fn host_of_base_url(base_url: &str) -> Option<String> {
    Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

/// Classifies image URLs as local (skip) or external (download candidate).
#[derive(Debug)]
pub struct DomainFilter {
    local: Option<Regex>,
}

impl DomainFilter {
    /// `except_domains` is a comma-separated hostname list; a `*.` prefix
    /// matches one subdomain label. The site's own hosts are always local.
    pub fn new(
        except_domains: &str,
        base_host: Option<&str>,
        request_host: Option<&str>,
    ) -> Self {
        let mut patterns: Vec<String> = Vec::new();
        for entry in except_domains.split(',') {
            let entry = entry.trim().to_ascii_lowercase();
            if entry.is_empty() {
                continue;
            }
            patterns.push(wildcard_host_pattern(&entry));
        }
        for host in [base_host, request_host].into_iter().flatten() {
            let host = host.trim().to_ascii_lowercase();
            if host.is_empty() {
                continue;
            }
            let escaped = regex::escape(&host);
            if !patterns.contains(&escaped) {
                patterns.push(escaped);
            }
        }

        let local = if patterns.is_empty() {
            None
        } else {
            let pattern = format!("(?i)^https?://({})/", patterns.join("|"));
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(error = %e, "unusable domain exclusion list, ignoring it");
                    None
                }
            }
        };
        Self { local }
    }

    /// References that are not absolute http(s) URLs are already local and
    /// never downloaded.
    pub fn is_local(&self, url: &str) -> bool {
        if !has_http_scheme(url) {
            return true;
        }
        match &self.local {
            Some(re) => re.is_match(url),
            None => false,
        }
    }
}

fn has_http_scheme(url: &str) -> bool {
    url.get(..7).is_some_and(|s| s.eq_ignore_ascii_case("http://"))
        || url.get(..8).is_some_and(|s| s.eq_ignore_ascii_case("https://"))
}

fn wildcard_host_pattern(entry: &str) -> String {
    regex::escape(entry).replace(r"\*\.", r"[a-z0-9-]+\.")
}
