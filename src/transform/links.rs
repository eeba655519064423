//! Link and asset extraction
//!
//! # Link Extraction Rules
//!
//! **Include:**
//! - `<a href="...">` anywhere in the document, including navigation regions
//!
//! **Exclude:**
//! - `<a href="..." download>`
//! - `javascript:`, `mailto:`, `tel:` links and data URIs
//! - Fragment-only references (same page anchors)
//! - Anything that does not resolve to an http(s) URL
//!
//! Relative references resolve against `<base href>` when the page declares
//! one, otherwise against the page's own URL.

use crate::transform::document::{Asset, AssetKind};
use crate::url::{CanonicalUrl, Canonicalizer, SiteScope};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Links found in a page, split by site membership
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedLinks {
    pub internal: Vec<CanonicalUrl>,
    pub external: Vec<CanonicalUrl>,
}

pub(crate) fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Returns the URL relative references in `document` resolve against
pub fn document_base(document: &Html, source: &Url) -> Url {
    selector("base[href]")
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr("href"))
                .and_then(|href| resolve_href(href, source))
        })
        .unwrap_or_else(|| source.clone())
}

/// Resolves a link href to an absolute http(s) URL
///
/// Returns None if the link should be excluded:
/// - empty or fragment-only references
/// - javascript:, mailto:, tel: schemes and data: URIs
/// - references that fail to resolve or resolve to another scheme
pub fn resolve_href(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

/// Extracts every anchor in the document as canonical URLs
pub fn extract_links(
    document: &Html,
    base: &Url,
    canonicalizer: &Canonicalizer,
    scope: &SiteScope,
) -> ExtractedLinks {
    let mut links = ExtractedLinks::default();
    let mut seen = HashSet::new();

    let Some(a_selector) = selector("a[href]") else {
        return links;
    };

    for element in document.select(&a_selector) {
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_href(href, base))
        else {
            continue;
        };

        let canonical = match canonicalizer.normalize(url) {
            Ok(c) => c,
            Err(e) => {
                tracing::trace!("Skipping link that does not canonicalize: {}", e);
                continue;
            }
        };

        if !seen.insert(canonical.clone()) {
            continue;
        }

        if scope.contains(&canonical) {
            links.internal.push(canonical);
        } else {
            links.external.push(canonical);
        }
    }

    links
}

/// Extracts image, script and stylesheet references in document order
pub fn extract_assets(document: &Html, base: &Url) -> Vec<Asset> {
    let mut assets = Vec::new();
    let mut seen = HashSet::new();

    let Some(asset_selector) = selector("img[src], script[src], link[href]") else {
        return assets;
    };

    for element in document.select(&asset_selector) {
        let el = element.value();
        let (kind, reference) = match el.name() {
            "img" => (AssetKind::Image, el.attr("src")),
            "script" => (AssetKind::Script, el.attr("src")),
            "link" if is_stylesheet(el.attr("rel")) => (AssetKind::Stylesheet, el.attr("href")),
            _ => continue,
        };

        let Some(mut url) = reference.and_then(|r| resolve_href(r, base)) else {
            continue;
        };
        url.set_fragment(None);

        if seen.insert(url.clone()) {
            assets.push(Asset { kind, url });
        }
    }

    assets
}

fn is_stylesheet(rel: Option<&str>) -> bool {
    rel.map_or(false, |rel| {
        rel.split_ascii_whitespace()
            .any(|token| token.eq_ignore_ascii_case("stylesheet"))
    })
}
