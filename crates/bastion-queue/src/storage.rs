//! YAML file persistence shared by the mailbox and the ledger.
//!
//! Writes go to a hidden temp file in the destination directory and are
//! renamed over the target, so readers in other processes see either the old
//! or the new document, never a torn one.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::QueueError;

/// File extension for every queue document.
pub const RECORD_EXTENSION: &str = "yaml";

/// Load a YAML document. `Ok(None)` when the file is absent or blank.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, QueueError> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    serde_yaml::from_str(&content)
        .map(Some)
        .map_err(|source| QueueError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Serialize `value` and atomically replace `path` with it.
pub fn write_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), QueueError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let data = serde_yaml::to_string(value).map_err(QueueError::Serialize)?;

    // Dot-prefixed, non-.yaml name: watchers and bulk reads skip it.
    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(data.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| QueueError::Io(e.error))?;
    Ok(())
}

/// Reject names that are empty, hidden, or could escape their directory.
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), QueueError> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(QueueError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// `true` for `<stem>.yaml` files that are not hidden temp files.
pub fn is_record_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_none_or(|n| n.starts_with('.'));
    !hidden && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn missing_and_blank_files_read_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing: Option<BTreeMap<String, String>> =
            read_yaml(&dir.path().join("nope.yaml")).expect("read");
        assert!(missing.is_none());

        let blank = dir.path().join("blank.yaml");
        fs::write(&blank, "  \n").expect("write");
        let blank: Option<BTreeMap<String, String>> = read_yaml(&blank).expect("read");
        assert!(blank.is_none());
    }

    #[test]
    fn corrupt_file_is_typed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "messages: [unterminated").expect("write");
        let err = read_yaml::<BTreeMap<String, Vec<String>>>(&path).unwrap_err();
        assert!(matches!(err, QueueError::Corrupt { .. }), "got {err:?}");
    }

    #[test]
    fn atomic_write_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/inbox/envoy.yaml");
        let mut doc = BTreeMap::new();
        doc.insert("k".to_string(), "v".to_string());
        write_yaml_atomic(&path, &doc).expect("write");

        let back: Option<BTreeMap<String, String>> = read_yaml(&path).expect("read");
        assert_eq!(back, Some(doc));

        let leftovers: Vec<_> = fs::read_dir(path.parent().expect("parent"))
            .expect("read_dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn name_validation() {
        for ok in ["envoy", "cmd_001", "specialist-2"] {
            validate_name("recipient", ok).expect(ok);
        }
        for bad in ["", ".", "..", "../etc", "a/b", "a\\b", ".hidden", "x\ny"] {
            assert!(validate_name("recipient", bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn record_file_detection() {
        assert!(is_record_file(Path::new("/q/inbox/envoy.yaml")));
        assert!(!is_record_file(Path::new("/q/inbox/.tmpAbC.tmp")));
        assert!(!is_record_file(Path::new("/q/inbox/.envoy.yaml")));
        assert!(!is_record_file(Path::new("/q/inbox/notes.txt")));
    }
}
