use crate::url::CanonicalUrl;
use crate::UrlError;
use serde::{Deserialize, Serialize};
use url::Url;

/// List of tracking query parameters removed under [`QueryPolicy::StripTracking`]
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "ref",
    "source",
];

/// How query strings take part in URL identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryPolicy {
    /// Every parameter is kept; parameters are sorted by key
    Keep,
    /// Tracking parameters are removed; the rest are sorted by key
    #[default]
    StripTracking,
    /// The query string is dropped, so `/p?a=1` and `/p?a=2` are one page
    Ignore,
}

impl QueryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::StripTracking => "strip-tracking",
            Self::Ignore => "ignore",
        }
    }
}

/// Produces [`CanonicalUrl`]s according to a [`QueryPolicy`]
///
/// # Normalization Steps
///
/// 1. Parse the URL (or resolve it against a base); reject if malformed
/// 2. Only `http` and `https` are accepted
/// 3. Scheme and host are lowercased and a default port is dropped
/// 4. Normalize path:
///    - Remove dot segments (. and ..) and duplicate slashes
///    - Remove trailing slash (except for root /)
///    - Empty path becomes /
/// 5. Remove fragment (everything after #)
/// 6. Apply the query policy, sorting surviving parameters by key
/// 7. Remove empty query string (trailing ?)
///
/// # Examples
///
/// ```
/// use sitescribe::url::{Canonicalizer, QueryPolicy};
///
/// let canon = Canonicalizer::new(QueryPolicy::StripTracking);
/// let url = canon.canonicalize("HTTP://Example.COM:80/docs/?utm_source=x#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/docs");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Canonicalizer {
    policy: QueryPolicy,
}

impl Canonicalizer {
    pub fn new(policy: QueryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> QueryPolicy {
        self.policy
    }

    /// Canonicalizes an absolute URL string
    pub fn canonicalize(&self, url_str: &str) -> Result<CanonicalUrl, UrlError> {
        let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
        self.normalize(url)
    }

    /// Resolves `href` against `base` and canonicalizes the result
    pub fn resolve(&self, href: &str, base: &Url) -> Result<CanonicalUrl, UrlError> {
        let url = base
            .join(href.trim())
            .map_err(|e| UrlError::Parse(e.to_string()))?;
        self.normalize(url)
    }

    /// Canonicalizes an already parsed URL
    pub fn normalize(&self, mut url: Url) -> Result<CanonicalUrl, UrlError> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UrlError::InvalidScheme(format!(
                "Only HTTP and HTTPS schemes are supported, got: {}",
                url.scheme()
            )));
        }

        // Host lowercasing and default-port removal are done by the url crate.
        if url.host_str().map_or(true, str::is_empty) {
            return Err(UrlError::MissingHost);
        }

        let normalized_path = normalize_path(url.path());
        url.set_path(&normalized_path);

        url.set_fragment(None);

        if url.query().is_some() {
            let params = match self.policy {
                QueryPolicy::Ignore => Vec::new(),
                QueryPolicy::Keep => sorted_query_params(&url, |_| true),
                QueryPolicy::StripTracking => sorted_query_params(&url, |k| !is_tracking_param(k)),
            };

            if params.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut().clear().extend_pairs(params);
            }
        }

        Ok(CanonicalUrl::from_normalized(url))
    }
}

/// Normalizes a URL path by removing dot segments, empty segments and the trailing slash
fn normalize_path(path: &str) -> String {
    let mut normalized_segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                normalized_segments.pop();
            }
            _ => normalized_segments.push(segment),
        }
    }

    if normalized_segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", normalized_segments.join("/"))
}

/// Collects the query parameters accepted by `keep`, sorted by key
///
/// The sort is stable so repeated keys keep their relative order.
fn sorted_query_params(url: &Url, keep: impl Fn(&str) -> bool) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !key.is_empty() && keep(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
