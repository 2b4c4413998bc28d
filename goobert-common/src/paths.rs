//! Media path helpers
//!
//! Lexical normalization (no filesystem access) and media-kind detection
//! by extension.

use std::path::{Component, Path, PathBuf};

/// Video file extensions recognised by the scanner (lowercase)
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "m4v", "flv", "wmv", "mpg", "mpeg", "ts", "ogv", "webm",
];

/// Still image extensions recognised by the scanner (lowercase)
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "avif", "bmp", "tif", "tiff", "gif",
];

/// Normalize a path lexically
///
/// `.` components are dropped, `..` pops a preceding normal component, and
/// repeated separators collapse. A `..` that cannot be resolved is kept on
/// relative paths and dropped at the root.
pub fn normalize_path(path: &str) -> String {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return if path.is_empty() { String::new() } else { ".".to_string() };
    }
    out.iter().collect::<PathBuf>().to_string_lossy().into_owned()
}

fn extension_lower(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// True if the path has a still image extension (case-insensitive)
pub fn is_image_path(path: &str) -> bool {
    extension_lower(path).is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// True if the path has a video extension (case-insensitive)
pub fn is_video_path(path: &str) -> bool {
    extension_lower(path).is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
}

/// True for anything the wall can play
pub fn is_media_path(path: &str) -> bool {
    is_video_path(path) || is_image_path(path)
}
