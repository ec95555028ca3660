use crate::download::DownloadOutcome;
use crate::scan::ImageRef;
use regex::Regex;

/// Replaces any existing status marker on the tag and inserts the new one
/// as the first attribute. Idempotent for a given token.
pub fn set_status_attr(tag: &str, token: &str) -> String {
    let strip_re = Regex::new(r#"\sdata-autoattach="[^"]+?""#).expect("status strip regex");
    let stripped = strip_re.replace_all(tag, "");
    let open_re = Regex::new(r"(?i)^<img\s+").expect("img open regex");
    open_re
        .replace(&stripped, format!(r#"<img data-autoattach="{token}" "#))
        .into_owned()
}

/// Substitutes the annotated tag into the content. On success the `src`
/// value is also swapped for the stored filename, attribute-escaped.
/// Identical tags elsewhere in the content are rewritten together.
pub fn apply_outcome(content: &str, image: &ImageRef, outcome: &DownloadOutcome) -> String {
    let annotated = match outcome {
        DownloadOutcome::Success { filename, .. } => {
            let escaped = html_escape::encode_double_quoted_attribute(filename.as_str());
            let tag = image.full_match.replace(&image.raw_url_text, &escaped);
            set_status_attr(&tag, outcome.token())
        }
        _ => set_status_attr(&image.full_match, outcome.token()),
    };
    content.replace(&image.full_match, &annotated)
}
