//! Storage module for persisting crawl output
//!
//! This module handles everything the crawler writes to disk:
//! - mapping canonical URLs to paths under the output directory
//! - atomic document writes
//! - per-domain `metadata.json` maintenance

mod metadata;
mod site_tree;
mod traits;
mod writer;

pub use metadata::{load_metadata, ConfigSnapshot, CrawlMetadata, MetadataStore, METADATA_FILE_NAME};
pub use site_tree::{SiteTree, DOCUMENT_EXTENSION};
pub use traits::{PageStore, StorageError, StorageResult};
pub use writer::{render_document, write_atomic, SiteStore};
