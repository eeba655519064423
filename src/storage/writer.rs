//! Markdown page writer
//!
//! Renders a [`Document`] and writes it through a temporary file in the
//! target directory that is then renamed into place, so readers never see a
//! partial page.

use crate::storage::site_tree::SiteTree;
use crate::storage::traits::{PageStore, StorageError, StorageResult};
use crate::transform::Document;
use crate::url::CanonicalUrl;
use chrono::SecondsFormat;
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Writes documents as markdown files laid out by [`SiteTree`]
#[derive(Debug, Clone)]
pub struct SiteStore {
    tree: SiteTree,
    include_assets: bool,
}

impl SiteStore {
    pub fn new(output_dir: impl Into<PathBuf>, include_assets: bool) -> Self {
        Self {
            tree: SiteTree::new(output_dir),
            include_assets,
        }
    }

    pub fn tree(&self) -> &SiteTree {
        &self.tree
    }
}

impl PageStore for SiteStore {
    fn store(&self, document: &Document) -> StorageResult<PathBuf> {
        let path = self.tree.path_for(&document.source_url);
        let contents = render_document(document, self.include_assets);
        write_atomic(&path, contents.as_bytes())?;
        Ok(path)
    }

    fn path_for(&self, url: &CanonicalUrl) -> PathBuf {
        self.tree.path_for(url)
    }
}

/// Renders the on-disk form of a document
///
/// ```text
/// # Title
///
/// Source: https://example.com/page
/// Fetched: 2024-01-01T00:00:00Z
///
/// ---
///
/// body...
///
/// ---
///
/// ## Links
///
/// ### Internal
///
/// 1. https://example.com/other
/// ```
pub fn render_document(document: &Document, include_assets: bool) -> String {
    let mut out = String::with_capacity(document.body.len() + 512);

    // Writing into a String cannot fail.
    let _ = writeln!(out, "# {}", document.title);
    let _ = writeln!(out);
    let _ = writeln!(out, "Source: {}", document.source_url);
    let _ = writeln!(
        out,
        "Fetched: {}",
        document.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "---");
    let _ = writeln!(out);
    if !document.body.is_empty() {
        let _ = writeln!(out, "{}", document.body);
        let _ = writeln!(out);
        let _ = writeln!(out, "---");
        let _ = writeln!(out);
    }
    let _ = writeln!(out, "## Links");

    write_list(
        &mut out,
        "Internal",
        document.internal_links.iter().map(|u| u.to_string()),
    );
    write_list(
        &mut out,
        "External",
        document.external_links.iter().map(|u| u.to_string()),
    );

    if include_assets {
        let assets = document.assets.as_deref().unwrap_or_default();
        write_list(
            &mut out,
            "Assets",
            assets.iter().map(|a| format!("[{}] {}", a.kind, a.url)),
        );
    }

    out
}

fn write_list(out: &mut String, heading: &str, items: impl Iterator<Item = String>) {
    let _ = writeln!(out);
    let _ = writeln!(out, "### {}", heading);
    let _ = writeln!(out);

    let mut count = 0;
    for (i, item) in items.enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, item);
        count += 1;
    }
    if count == 0 {
        let _ = writeln!(out, "_none_");
    }
}

/// Writes `contents` to `path` all-or-nothing
///
/// The data goes to a temporary file in the destination directory, which is
/// then renamed over `path`. Missing parent directories are created; a
/// concurrent creation of the same directory is not an error.
pub fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
