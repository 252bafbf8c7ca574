use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::LabelError;

/// Class names the shipped model was trained with, in output order.
pub const DEFAULT_CLASS_NAMES: [&str; 2] = ["benign", "malignant"];

pub fn default_class_names() -> Vec<String> {
    DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Reads one class name per line. Line order is the model output order.
pub fn load_class_names(file_path: &Path) -> Result<Vec<String>, LabelError> {
    let file = File::open(file_path).map_err(|source| LabelError::Io {
        path: file_path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut names = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|source| LabelError::Io {
            path: file_path.to_path_buf(),
            source,
        })?;
        let name = line.trim();
        if !name.is_empty() {
            names.push(name.to_string());
        }
    }

    if names.is_empty() {
        return Err(LabelError::Empty(file_path.to_path_buf()));
    }
    check_unique(&names)?;
    Ok(names)
}

fn check_unique(names: &[String]) -> Result<(), LabelError> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(LabelError::Duplicate(name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn labels_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_are_benign_then_malignant() {
        assert_eq!(default_class_names(), vec!["benign", "malignant"]);
    }

    #[test]
    fn loads_in_file_order_and_trims() {
        let f = labels_file("  nevus\n\nmelanoma \r\nkeratosis\n");
        let names = load_class_names(f.path()).unwrap();
        assert_eq!(names, vec!["nevus", "melanoma", "keratosis"]);
    }

    #[test]
    fn empty_file_is_rejected() {
        let f = labels_file("\n  \n");
        assert!(matches!(load_class_names(f.path()), Err(LabelError::Empty(_))));
    }

    #[test]
    fn duplicates_are_rejected() {
        let f = labels_file("benign\nmalignant\nbenign\n");
        match load_class_names(f.path()) {
            Err(LabelError::Duplicate(name)) => assert_eq!(name, "benign"),
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_class_names(&dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, LabelError::Io { .. }));
    }
}
