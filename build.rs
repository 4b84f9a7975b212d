//! Build script for fyp-portal
//!
//! Captures git commit hash at build time for version verification.

use std::process::Command;

fn git_output(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout).ok()
            } else {
                None
            }
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    println!(
        "cargo:rustc-env=GIT_COMMIT_SHORT={}",
        git_output(&["rev-parse", "--short", "HEAD"])
    );
    println!(
        "cargo:rustc-env=GIT_COMMIT_FULL={}",
        git_output(&["rev-parse", "HEAD"])
    );

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", timestamp);

    // Rebuild if git HEAD changes
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
}
