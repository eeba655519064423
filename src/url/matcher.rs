use crate::url::domain::strip_www;
use crate::url::CanonicalUrl;

/// File extensions that are never admitted for crawling
///
/// Links to these still show up in a document's link lists.
const NON_PAGE_EXTENSIONS: &[&str] = &[
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".zip", ".rar", ".tar", ".gz",
    ".7z", ".mp3", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".jpg", ".jpeg", ".png", ".gif",
    ".bmp", ".svg", ".ico", ".exe", ".dmg", ".pkg", ".deb", ".rpm",
];

/// Checks if a domain matches a wildcard pattern
///
/// This function supports two types of patterns:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches "example.com" and any of its
///    subdomains, however deeply nested
///
/// # Examples
///
/// ```
/// use sitescribe::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(!matches_wildcard("example.com", "other.com"));
///
/// assert!(matches_wildcard("*.example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "myexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Decides whether a host belongs to the crawled site
///
/// The site is the seed host with any leading `www.` removed, plus all of its
/// subdomains. Ports are not part of the comparison.
#[derive(Debug, Clone)]
pub struct SiteScope {
    pattern: String,
}

impl SiteScope {
    pub fn new(seed_host: &str) -> Self {
        let base = strip_www(&seed_host.to_lowercase()).to_string();
        Self {
            pattern: format!("*.{}", base),
        }
    }

    pub fn for_seed(seed: &CanonicalUrl) -> Self {
        Self::new(seed.host())
    }

    pub fn is_same_site(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        matches_wildcard(&self.pattern, strip_www(&host))
    }

    pub fn contains(&self, url: &CanonicalUrl) -> bool {
        self.is_same_site(url.host())
    }
}

/// Returns false for URLs whose path names a document, archive, media file or binary
pub fn is_crawlable(url: &CanonicalUrl) -> bool {
    let path = url.path().to_lowercase();
    !NON_PAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
