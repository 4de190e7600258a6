//! Page URL normalization and annotation links
//!
//! Annotations are scoped to a page by URL with the fragment stripped; the
//! fragment itself is reserved for naming an annotation to scroll to.

use url::Url;

/// Strip the fragment from a page URL.
///
/// Unparseable input is cut at the first `#` instead of being rejected.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.split('#').next().unwrap_or_default().trim().to_string(),
    }
}

/// Whether two URLs name the same page once fragments are ignored
pub fn same_page(a: &str, b: &str) -> bool {
    normalize_url(a) == normalize_url(b)
}

/// Annotation id named by the URL fragment, percent-decoded
pub fn fragment_target(raw: &str) -> Option<String> {
    let fragment = match Url::parse(raw.trim()) {
        Ok(url) => url.fragment().map(str::to_string),
        Err(_) => raw.split_once('#').map(|(_, f)| f.to_string()),
    }?;
    if fragment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(&fragment)
        .map(|d| d.into_owned())
        .unwrap_or(fragment);
    Some(decoded)
}

/// Link that opens `page_url` and scrolls to annotation `id`
pub fn annotation_link(page_url: &str, id: &str) -> String {
    format!("{}#{}", normalize_url(page_url), urlencoding::encode(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_normalize_to_same_page() {
        assert_eq!(
            normalize_url("https://ex.com/a#frag1"),
            normalize_url("https://ex.com/a#frag2")
        );
        assert_eq!(normalize_url("https://ex.com/a#frag1"), "https://ex.com/a");
        assert!(same_page("https://ex.com/a?q=1#x", "https://ex.com/a?q=1"));
        assert!(!same_page("https://ex.com/a", "https://ex.com/b"));
    }

    #[test]
    fn test_unparseable_url() {
        assert_eq!(normalize_url("not a url#frag"), "not a url");
        assert_eq!(fragment_target("not a url#frag"), Some("frag".to_string()));
    }

    #[test]
    fn test_fragment_target() {
        assert_eq!(fragment_target("https://ex.com/a"), None);
        assert_eq!(fragment_target("https://ex.com/a#"), None);
        assert_eq!(
            fragment_target("https://ex.com/a#note%201"),
            Some("note 1".to_string())
        );
    }

    #[test]
    fn test_link_round_trip() {
        let link = annotation_link("https://ex.com/a#old", "id with space");
        assert_eq!(link, "https://ex.com/a#id%20with%20space");
        assert_eq!(fragment_target(&link), Some("id with space".to_string()));
        assert!(same_page(&link, "https://ex.com/a"));
    }
}
