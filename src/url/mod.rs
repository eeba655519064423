//! URL handling module for Sitescribe
//!
//! This module provides URL canonicalization, site scoping
//! and the crawlability filter.

mod canonical;
mod domain;
mod matcher;
mod normalize;

pub use canonical::CanonicalUrl;
pub use matcher::{is_crawlable, matches_wildcard, SiteScope};
pub use normalize::{Canonicalizer, QueryPolicy};
