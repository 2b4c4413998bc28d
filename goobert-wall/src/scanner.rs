//! Media file scanner
//!
//! Recursive directory walk returning normalized media paths, sorted.
//! Runs on a blocking thread; never call it from the wall loop directly.

use crate::error::{Error, Result};
use goobert_common::paths::{is_media_path, normalize_path};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Space-separated AND of case-insensitive substrings on the file name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameFilter {
    terms: Vec<String>,
}

impl NameFilter {
    pub fn new(filter: &str) -> Self {
        Self {
            terms: filter.split_whitespace().map(str::to_lowercase).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, file_name: &str) -> bool {
        let name = file_name.to_lowercase();
        self.terms.iter().all(|term| name.contains(term.as_str()))
    }
}

/// Scan `root` for media files whose name passes `filter`
///
/// A file root yields itself when it has a media extension. Links are
/// followed; unreadable entries are skipped.
pub fn scan(root: &Path, filter: &NameFilter) -> Result<Vec<String>> {
    if !root.exists() {
        return Err(Error::NotFound(format!("Media source {}", root.display())));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().to_string_lossy();
        if !is_media_path(&path) {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if filter.matches(&name) {
            files.push(normalize_path(&path));
        }
    }
    files.sort();
    files.dedup();

    debug!(root = %root.display(), found = files.len(), "Scan finished");
    Ok(files)
}

/// Scan several roots, keeping the first occurrence of each file
pub fn scan_all<P: AsRef<Path>>(roots: &[P], filter: &NameFilter) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for root in roots {
        for file in scan(root.as_ref(), filter)? {
            if !files.contains(&file) {
                files.push(file);
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    fn names(files: &[String]) -> Vec<String> {
        files
            .iter()
            .map(|f| Path::new(f).file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_filter_terms_are_anded() {
        let filter = NameFilter::new("  Cat  beach ");
        assert!(filter.matches("BEACH_cat_01.mp4"));
        assert!(!filter.matches("cat_garden.mp4"));
        assert!(NameFilter::new("").matches("anything.mkv"));
        assert!(NameFilter::new(" ").is_empty());
    }

    #[test]
    fn test_scan_recursive_sorted_media_only() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b.mp4");
        touch(dir.path(), "sub/a.MKV");
        touch(dir.path(), "sub/deeper/c.jpg");
        touch(dir.path(), "notes.txt");

        let files = scan(dir.path(), &NameFilter::default()).unwrap();
        assert_eq!(files.len(), 3);
        let mut sorted = files.clone();
        sorted.sort();
        assert_eq!(files, sorted);
        assert!(!names(&files).contains(&"notes.txt".to_string()));
    }

    #[test]
    fn test_scan_applies_filter() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "holiday_beach.mp4");
        touch(dir.path(), "holiday_city.mp4");
        let files = scan(dir.path(), &NameFilter::new("beach")).unwrap();
        assert_eq!(names(&files), vec!["holiday_beach.mp4".to_string()]);
    }

    #[test]
    fn test_file_root_yields_itself() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "clip.webm");
        touch(dir.path(), "readme.md");
        assert_eq!(scan(&dir.path().join("clip.webm"), &NameFilter::default()).unwrap().len(), 1);
        assert!(scan(&dir.path().join("readme.md"), &NameFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let result = scan(&dir.path().join("gone"), &NameFilter::default());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_scan_all_dedups() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.mp4");
        let roots = [dir.path().to_path_buf(), dir.path().join("a.mp4")];
        assert_eq!(scan_all(&roots, &NameFilter::default()).unwrap().len(), 1);
    }
}
