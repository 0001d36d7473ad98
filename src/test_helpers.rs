//! Shared test utilities for the catalog-extract test suite.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! write_file(tmp.path(), "src/app/products/trinnov/data.ts", "export const trinnovProducts = [];");
//! let content = read_json(tmp.path(), "src/app/products/trinnov/content.json");
//! ```

use serde_json::Value as Json;
use std::path::Path;
use tempfile::TempDir;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

// =========================================================================
// File helpers
// =========================================================================

/// Write `content` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Parse the JSON file at `root/relative`, panicking with the path on failure.
pub fn read_json(root: &Path, relative: &str) -> Json {
    let text = std::fs::read_to_string(root.join(relative))
        .unwrap_or_else(|e| panic!("cannot read {relative}: {e}"));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("{relative} is not JSON: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve_config, stock_defaults_value};

    #[test]
    fn fixtures_hold_every_stock_source() {
        let tmp = setup_fixtures();
        let config = resolve_config(stock_defaults_value().unwrap(), None).unwrap();
        for (name, catalog) in &config.catalogs {
            let files: Vec<String> = match catalog {
                crate::config::Catalog::Bundle(c) => c.files(),
                other => other.sources().iter().map(|s| s.path.to_string()).collect(),
            };
            for file in files {
                assert!(tmp.path().join(&file).is_file(), "{name}: missing fixture {file}");
            }
        }
    }

    #[test]
    fn write_then_read_json() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a/b/c.json", r#"{"k": [1, 2]}"#);
        assert_eq!(read_json(tmp.path(), "a/b/c.json"), serde_json::json!({"k": [1, 2]}));
    }
}
