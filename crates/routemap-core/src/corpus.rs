//! Corpus loading from a directory tree.

use std::path::Path;

use ignore::WalkBuilder;
use tracing::{debug, info};

use crate::errors::RouteMapResult;
use crate::models::{Language, SourceUnit};

const IMPLICIT_IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
    "build",
];

/// Per-directory ignore file honored next to `.gitignore`.
pub const IGNORE_FILENAME: &str = ".routemapignore";

/// Load every supported source file under `root`.
///
/// `.gitignore` and `.routemapignore` rules are honored, hidden entries and
/// dependency directories are skipped. Identities are `/`-separated paths
/// relative to `root`, and units come back sorted by identity.
pub fn load_corpus(root: &Path) -> RouteMapResult<Vec<SourceUnit>> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .add_custom_ignore_filename(IGNORE_FILENAME)
        .filter_entry(|entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            let name = entry.file_name().to_string_lossy();
            !(is_dir && IMPLICIT_IGNORED_DIRS.contains(&&*name))
        });

    let mut units = Vec::new();
    for result in builder.build() {
        let entry = result?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let identity = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        let Some(language) = Language::from_path(&identity) else {
            continue;
        };
        let bytes = std::fs::read(path)?;
        debug!(unit = %identity, bytes = bytes.len(), "loaded unit");
        units.push(SourceUnit::with_language(
            identity,
            language,
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
    }
    units.sort_by(|a, b| a.identity.cmp(&b.identity));
    info!(root = %root.display(), units = units.len(), "corpus loaded");
    Ok(units)
}
