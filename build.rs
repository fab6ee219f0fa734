use std::process::Command;

/// Commit reported by `/health`. A `GIT_HASH` set in the build environment
/// wins, so images built outside a checkout can still carry one.
fn commit_hash() -> String {
    if let Ok(hash) = std::env::var("GIT_HASH") {
        if !hash.trim().is_empty() {
            return hash.trim().to_string();
        }
    }

    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    println!("cargo:rustc-env=GIT_HASH={}", commit_hash());

    println!("cargo:rerun-if-env-changed=GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
}
