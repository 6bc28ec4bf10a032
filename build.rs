use std::env;
use std::process::Command;
use time::OffsetDateTime;

/// Exact git tag on HEAD, if any
fn head_tag() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--exact-match"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|tag| tag.trim().to_string())
}

fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/tags");

    // Reproducible builds pin the year through SOURCE_DATE_EPOCH
    let build_year = env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|raw| raw.parse::<i64>().ok())
        .and_then(|epoch| OffsetDateTime::from_unix_timestamp(epoch).ok())
        .map_or_else(|| OffsetDateTime::now_utc().year(), |dt| dt.year());

    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());
    let tagged = head_tag().is_some_and(|tag| tag == format!("v{version}"));
    let display = if tagged || env::var("PROFILE").as_deref() == Ok("release") {
        version
    } else {
        format!("{version}-dev")
    };

    println!("cargo:rustc-env=APP_BUILD_YEAR={build_year}");
    println!("cargo:rustc-env=APP_VERSION_DISPLAY={display}");
}
