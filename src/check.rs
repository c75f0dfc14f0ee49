//! The Check Engine: a read-only traversal that re-hashes every file in the
//! format of its original recorded entry and reports drift without ever
//! writing a new generation.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MhlError;
use crate::hash;
use crate::history::{self, History};
use crate::traversal;

#[derive(Debug, Default)]
pub struct CheckOutcome {
    pub mismatched_paths: Vec<String>,
    pub new_paths: Vec<String>,
    pub missing_paths: Vec<String>,
    pub io_failures: Vec<(String, String)>,
}

impl CheckOutcome {
    pub fn is_verification_failure(&self) -> bool {
        !self.mismatched_paths.is_empty() || !self.io_failures.is_empty()
    }

    pub fn has_new_files(&self) -> bool {
        !self.new_paths.is_empty()
    }

    pub fn is_completeness_failure(&self) -> bool {
        !self.missing_paths.is_empty()
    }
}

/// Verifies `root` against its existing history. Fails with `NoHistory` if
/// no generation has ever been sealed there — check has nothing to check
/// against.
pub fn check(root: &Path) -> Result<CheckOutcome, MhlError> {
    let history = History::load_from_path(root)?;
    if history.generations.is_empty() {
        return Err(MhlError::NoHistory(root.to_path_buf()));
    }

    let mut expected = history.set_of_expected_paths();
    let nested_roots: HashSet<PathBuf> = history.nested.iter().map(|(_, h)| h.root.clone()).collect();
    let visits = traversal::post_order_lexicographic(root, history::HISTORY_DIR_NAME, &nested_roots)?;

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut mismatched_paths = Vec::new();
    let mut new_paths = Vec::new();
    let mut io_failures = Vec::new();

    for (dir, children) in &visits {
        for child in children {
            let child_path = dir.join(&child.name);
            if child.is_directory {
                // Check never recomputes directory hashes, only files, but
                // a directory recorded by a prior `-d`
                // seal is still a path `expected` tracks, so its presence on
                // disk must clear it the same as a file's would.
                seen.insert(child_path.clone());
                expected.remove(&child_path);
                continue;
            }
            seen.insert(child_path.clone());
            expected.remove(&child_path);

            let relative = history.relative_path_string(&child_path);
            let (owning_history, owning_relative) = history.find_history_for(&relative);
            match owning_history.find_original_hash_entry(&owning_relative) {
                Some(entry) => match hash::file_hash(entry.format, &child_path) {
                    Ok(value) => {
                        if value != entry.value {
                            mismatched_paths.push(child_path.display().to_string());
                        }
                    }
                    Err(MhlError::IoFailure { path, source }) => {
                        io_failures.push((path.display().to_string(), source.to_string()));
                    }
                    Err(other) => return Err(other),
                },
                None => new_paths.push(child_path.display().to_string()),
            }
        }
    }

    let mut missing_paths: Vec<String> = expected
        .into_iter()
        .filter(|p| !seen.contains(p))
        .map(|p| p.display().to_string())
        .collect();
    missing_paths.sort();

    Ok(CheckOutcome {
        mismatched_paths,
        new_paths,
        missing_paths,
        io_failures,
    })
}
