use std::fs;
use std::path::{Path, PathBuf};

const VERSION_ENV: &str = "CAS_CLIENT_VERSION";

fn workspace_version_file(manifest_dir: &Path) -> PathBuf {
    // crates/cas-client-app -> workspace root
    manifest_dir
        .ancestors()
        .nth(2)
        .expect("cas-client-app should sit two levels below the workspace root")
        .join("VERSION")
}

fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")
        .map(PathBuf::from)
        .expect("cargo sets CARGO_MANIFEST_DIR for cas-client-app");
    let version_path = workspace_version_file(&manifest_dir);
    println!("cargo:rerun-if-changed={}", version_path.display());

    let contents = fs::read_to_string(&version_path).unwrap_or_else(|error| {
        panic!("cas-client-app needs {}: {error}", version_path.display())
    });
    let version = contents.trim();
    assert!(
        !version.is_empty() && !version.contains(char::is_whitespace),
        "{} must hold a single non-empty version token",
        version_path.display()
    );

    println!("cargo:rustc-env={VERSION_ENV}={version}");
}
