// File discovery: directory walk with glob filters and a root containment guard

use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::{IndexError, Result};
use crate::index::FileRecord;

/// Extensions the extractor understands; other files are recorded but not parsed
pub const EXTRACTABLE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs"];

/// A glob compiled to an anchored regex.
///
/// `**` crosses path separators (a leading `**/` may also match nothing),
/// `*` stays within one segment and `?` matches a single character.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&glob_to_regex(pattern))
            .map_err(|e| IndexError::InvalidArgument(format!("Invalid pattern '{}': {}", pattern, e)))?;
        Ok(Self { regex })
    }

    /// Match against a forward-slash relative path
    pub fn is_match(&self, relative_path: &str) -> bool {
        self.regex.is_match(relative_path)
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    regex.push_str("(?:.*/)?");
                } else {
                    regex.push_str(".*");
                }
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Include/exclude filter over project-relative paths
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Vec<GlobPattern>,
    exclude: Vec<GlobPattern>,
}

impl FileFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: include.iter().map(|p| GlobPattern::new(p)).collect::<Result<_>>()?,
            exclude: exclude.iter().map(|p| GlobPattern::new(p)).collect::<Result<_>>()?,
        })
    }

    /// Excluded if any exclude pattern matches; otherwise included when no
    /// include patterns are set or at least one matches.
    pub fn should_include(&self, relative_path: &str) -> bool {
        if self.exclude.iter().any(|p| p.is_match(relative_path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.is_match(relative_path))
    }

    /// A directory is pruned when `<dir>/` already matches an exclude pattern
    pub fn excludes_dir(&self, relative_dir: &str) -> bool {
        let with_slash = format!("{}/", relative_dir);
        self.exclude.iter().any(|p| p.is_match(&with_slash))
    }
}

pub fn is_extractable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| EXTRACTABLE_EXTENSIONS.contains(&ext))
}

/// Forward-slash path of `path` relative to `root`
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

/// Walk `root` and return the files accepted by `filter`, in a stable order.
///
/// Symlinks are followed, but anything whose resolved path leaves the root is
/// skipped. Unreadable entries are skipped.
pub fn discover(root: &Path, filter: &FileFilter) -> Vec<PathBuf> {
    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    let stays_inside = |entry: &DirEntry| -> bool {
        if entry.depth() == 0 {
            return true;
        }
        if entry.path_is_symlink() {
            let inside = entry
                .path()
                .canonicalize()
                .map(|resolved| resolved.starts_with(&canonical_root))
                .unwrap_or(false);
            if !inside {
                debug!("Skipping path outside project root: {}", entry.path().display());
                return false;
            }
        }
        if entry.file_type().is_dir() {
            return !filter.excludes_dir(&relative_path(root, entry.path()));
        }
        true
    };

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(stays_inside);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        if filter.should_include(&relative_path(root, entry.path())) {
            files.push(entry.into_path());
        }
    }

    debug!("Discovered {} files under {}", files.len(), root.display());
    files
}

/// Build the [`FileRecord`] for a discovered file
pub fn file_record(root: &Path, path: &Path, metadata: &std::fs::Metadata) -> FileRecord {
    let last_modified = metadata
        .modified()
        .map(|time| chrono::DateTime::<chrono::Utc>::from(time).timestamp_millis())
        .unwrap_or(0);

    FileRecord {
        path: path.to_string_lossy().into_owned(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        extension: path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default(),
        size: metadata.len(),
        last_modified,
        relative_path: relative_path(root, path),
    }
}
