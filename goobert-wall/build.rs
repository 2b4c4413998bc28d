//! Build script for goobert-wall
//!
//! Captures build identification shown by `goobert --version`:
//! - Git commit hash (short form)
//! - Build timestamp

use std::process::Command;

fn main() {
    let git_hash = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let build_timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    println!("cargo:rustc-env=GOOBERT_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=GOOBERT_BUILD_TIMESTAMP={}", build_timestamp);
}
