//! Content transformer: fetched HTML to [`Document`]
//!
//! This module handles:
//! - Extracting the page title
//! - Stripping navigation, script and style regions
//! - Converting the main content to markdown
//! - Extracting and classifying links, and optionally asset references
//!
//! Transformation never fails a page: when no content can be converted the
//! body falls back to the page's plain text, then to the raw input.

mod document;
mod links;
mod markdown;

pub use document::{Asset, AssetKind, Document};
pub use links::{document_base, extract_assets, extract_links, resolve_href, ExtractedLinks};
pub use markdown::to_markdown;

use crate::url::{CanonicalUrl, Canonicalizer, SiteScope};
use chrono::Utc;
use links::selector;
use scraper::{ElementRef, Html};
use thiserror::Error;
use url::Url;

/// Errors raised while converting a page; recovered inside the transformer
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("No convertible content in {url}")]
    NoContent { url: String },
}

/// Converts HTML pages into [`Document`]s for one crawl
#[derive(Debug, Clone)]
pub struct ContentTransformer {
    canonicalizer: Canonicalizer,
    scope: SiteScope,
    include_assets: bool,
}

impl ContentTransformer {
    pub fn new(canonicalizer: Canonicalizer, scope: SiteScope, include_assets: bool) -> Self {
        Self {
            canonicalizer,
            scope,
            include_assets,
        }
    }

    /// Converts `html` fetched from `source_url`
    ///
    /// # Example
    ///
    /// ```
    /// use sitescribe::transform::ContentTransformer;
    /// use sitescribe::url::{Canonicalizer, SiteScope};
    ///
    /// let canon = Canonicalizer::default();
    /// let source = canon.canonicalize("https://example.com/").unwrap();
    /// let transformer = ContentTransformer::new(canon, SiteScope::for_seed(&source), false);
    ///
    /// let doc = transformer.transform(
    ///     r#"<title>Home</title><h1>Welcome</h1><a href="/about">About</a>"#,
    ///     &source,
    /// );
    /// assert_eq!(doc.title, "Home");
    /// assert_eq!(doc.internal_links[0].as_str(), "https://example.com/about");
    /// ```
    pub fn transform(&self, html: &str, source_url: &CanonicalUrl) -> Document {
        let document = Html::parse_document(html);
        let base = document_base(&document, source_url.as_url());

        let title = extract_title(&document).unwrap_or_else(|| source_url.to_string());

        let body = match convert_body(&document, &base, source_url) {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!("{}; falling back to plain text", e);
                fallback_body(&document, html)
            }
        };

        let links = extract_links(&document, &base, &self.canonicalizer, &self.scope);
        let assets = self
            .include_assets
            .then(|| extract_assets(&document, &base));

        Document {
            title,
            source_url: source_url.clone(),
            fetched_at: Utc::now(),
            body,
            internal_links: links.internal,
            external_links: links.external,
            assets,
        }
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = selector("title")?;

    document
        .select(&title_selector)
        .next()
        .map(|element| {
            element
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|s| !s.is_empty())
}

/// Picks the element holding the page's main content
///
/// `<main>` wins over `<article>`, which wins over `<body>`.
fn content_root(document: &Html) -> ElementRef<'_> {
    ["main", "article", "body"]
        .iter()
        .filter_map(|css| selector(css))
        .find_map(|sel| document.select(&sel).next())
        .unwrap_or_else(|| document.root_element())
}

fn convert_body(
    document: &Html,
    base: &Url,
    source_url: &CanonicalUrl,
) -> Result<String, TransformError> {
    let body = to_markdown(content_root(document), base);
    if body.trim().is_empty() {
        return Err(TransformError::NoContent {
            url: source_url.to_string(),
        });
    }
    Ok(body)
}

/// Plain text of the whole document, or the raw input when even that is empty
fn fallback_body(document: &Html, raw: &str) -> String {
    let text = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if text.is_empty() {
        raw.trim().to_string()
    } else {
        text
    }
}
