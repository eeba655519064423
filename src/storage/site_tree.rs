//! SiteTree mapping: canonical URL to filesystem path
//!
//! `output/<domain>/<segments...>/<name>.md`, where:
//! - the domain directory is the host, plus `_<port>` for non-default ports
//! - an empty or root path maps to `index`
//! - a trailing `.html`/`.htm` extension is dropped from the last segment
//! - a query string adds `-<8 hex chars of its SHA-256>` to the name
//! - characters that are invalid in file names become `_`

use crate::url::CanonicalUrl;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const DOCUMENT_EXTENSION: &str = "md";

/// Longest segment kept verbatim; longer ones are truncated and hashed
const MAX_SEGMENT_LEN: usize = 180;

/// Deterministic mapping from canonical URLs to paths under an output root
#[derive(Debug, Clone)]
pub struct SiteTree {
    root: PathBuf,
}

impl SiteTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name for the URL's host, e.g. `example.com` or `127.0.0.1_8080`
    pub fn domain_dir_name(url: &CanonicalUrl) -> String {
        sanitize_segment(&url.host_key().replace(':', "_"))
    }

    pub fn domain_dir(&self, url: &CanonicalUrl) -> PathBuf {
        self.root.join(Self::domain_dir_name(url))
    }

    /// Path of the page relative to its domain directory
    ///
    /// # Examples
    ///
    /// ```
    /// use sitescribe::storage::SiteTree;
    /// use sitescribe::url::Canonicalizer;
    /// use std::path::PathBuf;
    ///
    /// let canon = Canonicalizer::default();
    /// let url = canon.canonicalize("https://example.com/docs/intro.html").unwrap();
    /// assert_eq!(SiteTree::relative_path(&url), PathBuf::from("docs/intro.md"));
    ///
    /// let root = canon.canonicalize("https://example.com/").unwrap();
    /// assert_eq!(SiteTree::relative_path(&root), PathBuf::from("index.md"));
    /// ```
    pub fn relative_path(url: &CanonicalUrl) -> PathBuf {
        let mut segments: Vec<String> = url
            .as_url()
            .path_segments()
            .map(|parts| {
                parts
                    .filter(|s| !s.is_empty())
                    .map(sanitize_segment)
                    .collect()
            })
            .unwrap_or_default();

        let mut name = segments
            .pop()
            .map(|last| strip_html_extension(&last).to_string())
            .filter(|last| !last.is_empty())
            .unwrap_or_else(|| "index".to_string());

        if let Some(query) = url.query() {
            name = format!("{}-{}", name, short_hash(query));
        }

        let mut path: PathBuf = segments.into_iter().collect();
        path.push(format!("{}.{}", name, DOCUMENT_EXTENSION));
        path
    }

    /// Absolute path (under the root) of the page's document file
    pub fn path_for(&self, url: &CanonicalUrl) -> PathBuf {
        self.domain_dir(url).join(Self::relative_path(url))
    }
}

fn strip_html_extension(segment: &str) -> &str {
    let lower = segment.to_ascii_lowercase();
    for ext in [".html", ".htm"] {
        if lower.ends_with(ext) {
            return &segment[..segment.len() - ext.len()];
        }
    }
    segment
}

/// Replaces characters that are reserved in file names on common platforms
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = match cleaned.as_str() {
        "." | ".." => "_".to_string(),
        _ => cleaned,
    };

    if cleaned.len() <= MAX_SEGMENT_LEN {
        return cleaned;
    }

    let mut cut = MAX_SEGMENT_LEN;
    while !cleaned.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}-{}", &cleaned[..cut], short_hash(&cleaned))
}

fn short_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..4])
}
