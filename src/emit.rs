//! Writing extracted data as JSON files.
//!
//! Files are rendered with 2-space indentation, keys in insertion order and
//! no trailing newline, so re-running an unchanged catalog reproduces the
//! committed files byte for byte. Each write returns a [`WrittenFile`] with
//! a SHA-256 digest of the bytes and whether the file changed.

use sha2::{Digest, Sha256};
use serde_json::Value as Json;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmitError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// One output file, fully computed and ready to write.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedFile {
    /// Path relative to the site root.
    pub path: PathBuf,
    pub value: Json,
}

/// Record of a completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    /// Path relative to the site root.
    pub path: PathBuf,
    /// SHA-256 of the written bytes, hex encoded.
    pub digest: String,
    /// False when the file already held exactly these bytes.
    pub changed: bool,
    /// Top-level entries: array length, object key count, or 1.
    pub records: usize,
}

/// SHA-256 of `bytes` as a hex string.
pub fn digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// `JSON.stringify(value, null, 2)`.
pub fn render(value: &Json) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

fn record_count(value: &Json) -> usize {
    match value {
        Json::Array(items) => items.len(),
        Json::Object(map) => map.len(),
        _ => 1,
    }
}

/// Write `value` to `root/relative`, creating parent directories.
pub fn write_json(root: &Path, relative: &Path, value: &Json) -> Result<WrittenFile, EmitError> {
    let path = root.join(relative);
    let text = render(value).map_err(|source| EmitError::Json {
        path: relative.to_path_buf(),
        source,
    })?;
    let io_err = |source| EmitError::Io {
        path: relative.to_path_buf(),
        source,
    };
    let changed = match fs::read(&path) {
        Ok(existing) => existing != text.as_bytes(),
        Err(_) => true,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(&path, &text).map_err(io_err)?;
    tracing::info!(changed, "wrote {}", relative.display());
    Ok(WrittenFile {
        path: relative.to_path_buf(),
        digest: digest(text.as_bytes()),
        changed,
        records: record_count(value),
    })
}

/// Write every planned file in order, stopping at the first failure.
pub fn write_all(root: &Path, files: &[PlannedFile]) -> Result<Vec<WrittenFile>, EmitError> {
    files
        .iter()
        .map(|file| write_json(root, &file.path, &file.value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn renders_two_space_indent_without_trailing_newline() {
        let text = render(&json!({"b": [1, {"c": null}], "a": "x"})).unwrap();
        assert_eq!(
            text,
            "{\n  \"b\": [\n    1,\n    {\n      \"c\": null\n    }\n  ],\n  \"a\": \"x\"\n}"
        );
        assert_eq!(render(&json!([])).unwrap(), "[]");
    }

    #[test]
    fn creates_directories_and_reports_the_write() {
        let tmp = TempDir::new().unwrap();
        let rel = Path::new("src/app/products/amina/content/edge.json");
        let written = write_json(tmp.path(), rel, &json!([{"name": "E"}, {"name": "F"}])).unwrap();
        assert_eq!(written.path, rel);
        assert_eq!(written.records, 2);
        assert!(written.changed);
        assert_eq!(written.digest.len(), 64);
        let on_disk = fs::read_to_string(tmp.path().join(rel)).unwrap();
        assert_eq!(written.digest, digest(on_disk.as_bytes()));
    }

    #[test]
    fn rewriting_identical_content_is_unchanged() {
        let tmp = TempDir::new().unwrap();
        let rel = Path::new("out.json");
        let first = write_json(tmp.path(), rel, &json!({"a": 1})).unwrap();
        let second = write_json(tmp.path(), rel, &json!({"a": 1})).unwrap();
        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(first.digest, second.digest);

        let third = write_json(tmp.path(), rel, &json!({"a": 2})).unwrap();
        assert!(third.changed);
        assert_ne!(third.digest, first.digest);
    }

    #[test]
    fn write_all_keeps_order() {
        let tmp = TempDir::new().unwrap();
        let files = vec![
            PlannedFile {
                path: "b.json".into(),
                value: json!([]),
            },
            PlannedFile {
                path: "a.json".into(),
                value: json!("s"),
            },
        ];
        let written = write_all(tmp.path(), &files).unwrap();
        let paths: Vec<_> = written.iter().map(|w| w.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("b.json"), PathBuf::from("a.json")]);
        assert_eq!(written[1].records, 1);
    }

    #[test]
    fn write_failure_names_the_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("blocker"), "file, not a directory").unwrap();
        let err = write_json(tmp.path(), Path::new("blocker/out.json"), &json!([])).unwrap_err();
        assert!(err.to_string().contains("blocker/out.json"), "{err}");
    }
}
