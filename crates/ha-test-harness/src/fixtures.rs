//! Test fixtures
//!
//! Fixtures live in `tests/fixtures/` of the crate under test. Pass that
//! crate's `env!("CARGO_MANIFEST_DIR")` so the lookup does not resolve
//! against this crate.

use std::path::{Path, PathBuf};

fn fixture_path(manifest_dir: impl AsRef<Path>, name: &str) -> PathBuf {
    manifest_dir.as_ref().join("tests").join("fixtures").join(name)
}

/// Load a fixture file as a string
pub fn load_fixture(manifest_dir: impl AsRef<Path>, name: &str) -> String {
    let path = fixture_path(manifest_dir, name);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to load fixture '{}' from {:?}: {}", name, path, e))
}

/// Load a fixture file as JSON
pub fn load_json_fixture(manifest_dir: impl AsRef<Path>, name: &str) -> serde_json::Value {
    let content = load_fixture(manifest_dir, name);
    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture '{}' as JSON: {}", name, e))
}

/// Include a fixture of the calling crate at compile time
#[macro_export]
macro_rules! include_fixture {
    ($name:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/", $name))
    };
}
