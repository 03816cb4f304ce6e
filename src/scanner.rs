//! Directory traversal yielding markdown note paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

/// Lazily walks `root`, yielding `.md` files in a deterministic
/// (name-sorted) order.
///
/// Descent is pruned at excluded directory names and at dot-directories;
/// files under them are never yielded. Unreadable entries are silently
/// skipped so a permission problem in one subtree cannot stop the scan.
pub fn scan(root: &Path, excluded: &HashSet<String>) -> impl Iterator<Item = PathBuf> {
    let excluded = excluded.clone();
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| entry.depth() == 0 || descend(entry, &excluded))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_markdown(entry.path()))
        .map(|entry| entry.into_path())
}

fn descend(entry: &DirEntry, excluded: &HashSet<String>) -> bool {
    if !entry.file_type().is_dir() {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    !name.starts_with('.') && !excluded.contains(name.as_ref())
}

fn is_markdown(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("md")
}
