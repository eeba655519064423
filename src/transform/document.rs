use crate::url::CanonicalUrl;
use chrono::{DateTime, Utc};
use std::fmt;
use url::Url;

/// The converted form of one fetched page
///
/// Link lists are duplicate-free and keep the order in which links first
/// appear in the page.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Page title (from <title>), or the source URL when absent
    pub title: String,

    /// Canonical URL the page was fetched from
    pub source_url: CanonicalUrl,

    pub fetched_at: DateTime<Utc>,

    /// Markdown body
    pub body: String,

    /// Links on the same site as the seed
    pub internal_links: Vec<CanonicalUrl>,

    /// Links to other sites
    pub external_links: Vec<CanonicalUrl>,

    /// Image/script/stylesheet references, present only when asset tracking is on
    pub assets: Option<Vec<Asset>>,
}

impl Document {
    /// All discovered links, internal first
    pub fn links(&self) -> impl Iterator<Item = &CanonicalUrl> {
        self.internal_links.iter().chain(self.external_links.iter())
    }
}

/// Kinds of static resources referenced by a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Stylesheet,
    Script,
    Image,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stylesheet => "css",
            Self::Script => "js",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved reference to a static resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Asset {
    pub kind: AssetKind,
    pub url: Url,
}
