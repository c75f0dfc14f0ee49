//! The Record Engine: hashes an explicit set of paths into a new generation
//! without treating anything unlisted as missing.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MhlError;
use crate::hash::HashFormat;
use crate::history::{self, History};
use crate::seal::seal_file;
use crate::session::GenerationSession;
use crate::traversal;
use crate::types::{CreatorInfo, MediaHash};
use crate::utils;

#[derive(Debug, Default)]
pub struct RecordOutcome {
    pub generation_number: u32,
    pub mismatched_paths: Vec<String>,
    pub io_failures: Vec<(String, String)>,
}

impl RecordOutcome {
    pub fn is_verification_failure(&self) -> bool {
        !self.mismatched_paths.is_empty() || !self.io_failures.is_empty()
    }
}

/// Records `paths` (each absolute, under `root`) into a new generation.
/// Paths recorded in history but not named here are left alone: record
/// never raises a completeness failure.
pub fn record(root: &Path, paths: &[PathBuf], format: HashFormat) -> Result<RecordOutcome, MhlError> {
    let mut history = History::load_from_path(root)?;
    let mut session = GenerationSession::new(&history);
    let mut mismatched_paths = Vec::new();
    let mut io_failures = Vec::new();

    for path in paths {
        let metadata = fs::metadata(path).map_err(|source| MhlError::IoFailure {
            path: path.clone(),
            source,
        })?;
        if metadata.is_dir() {
            match record_directory(&history, &mut session, path, format) {
                Ok(ok) => {
                    if !ok {
                        mismatched_paths.push(path.display().to_string());
                    }
                }
                Err(MhlError::IoFailure { path: p, source }) => {
                    io_failures.push((p.display().to_string(), source.to_string()));
                }
                Err(other) => return Err(other),
            }
        } else {
            let relative = history.relative_path_string(path);
            match seal_file(&history, &mut session, path, &relative, format) {
                Ok((ok, _value)) => {
                    if !ok {
                        mismatched_paths.push(path.display().to_string());
                    }
                }
                Err(MhlError::IoFailure { path: p, source }) => {
                    io_failures.push((p.display().to_string(), source.to_string()));
                }
                Err(other) => return Err(other),
            }
        }
    }

    let generation_number = history.next_generation_number();
    let creator_info = CreatorInfo::now(utils::local_host_name());
    let root_media_hash = MediaHash::new_directory("");
    let generation = session.commit(generation_number, creator_info, root_media_hash);
    history.persist(generation)?;

    Ok(RecordOutcome {
        generation_number,
        mismatched_paths,
        io_failures,
    })
}

/// Hashes every file under an explicitly-named directory. Unlike the Seal
/// Engine, record never composes or records a directory hash for any
/// directory it encounters — the original `record` command only ever hashes
/// file content, and spec §6's `record` CLI surface has no `-d` flag to ask
/// for one. A nested history's root is still recorded as an ordinary path
/// marker (no hash entry), since its subtree is never walked regardless of
/// which engine is doing the walking.
fn record_directory(
    history: &History,
    session: &mut GenerationSession,
    dir: &Path,
    format: HashFormat,
) -> Result<bool, MhlError> {
    let nested_roots: std::collections::HashSet<PathBuf> =
        history.nested.iter().map(|(_, h)| h.root.clone()).collect();
    let visits = traversal::post_order_lexicographic(dir, history::HISTORY_DIR_NAME, &nested_roots)?;
    let mut success = true;

    for (visited_dir, children) in &visits {
        for child in children {
            let child_path = visited_dir.join(&child.name);
            if child.is_directory {
                if nested_roots.contains(&child_path) {
                    let relative = history.relative_path_string(&child_path);
                    session.append_nested_history_root(&relative);
                }
                continue;
            }
            let relative = history.relative_path_string(&child_path);
            let (ok, _value) = seal_file(history, session, &child_path, &relative, format)?;
            success &= ok;
        }
    }

    Ok(success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_explicit_file_without_completeness_enforcement() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("Stuff.txt"), b"stuff\n").unwrap();
        fs::write(root.join("Other.txt"), b"other\n").unwrap();

        let outcome = record(&root, &[root.join("Stuff.txt")], HashFormat::Xxh64).unwrap();
        assert_eq!(outcome.generation_number, 1);
        assert!(!outcome.is_verification_failure());

        let history = History::load_from_path(&root).unwrap();
        assert!(history.generations[0].find_media_hash("Stuff.txt").is_some());
        assert!(history.generations[0].find_media_hash("Other.txt").is_none());
    }

    #[test]
    fn records_explicit_directory_hashes_its_files_but_not_itself() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("A")).unwrap();
        fs::write(root.join("A/A1.txt"), b"A1\n").unwrap();

        let outcome = record(&root, &[root.join("A")], HashFormat::Xxh64).unwrap();
        assert!(!outcome.is_verification_failure());

        let history = History::load_from_path(&root).unwrap();
        let generation = &history.generations[0];
        assert!(generation.find_media_hash("A/A1.txt").unwrap().hash_for(HashFormat::Xxh64).is_some());
        // record never composes or records a directory hash, unlike seal -d.
        assert!(generation.find_media_hash("A").is_none());
    }

    #[test]
    fn recording_a_directory_does_not_rehash_a_nested_history_inside_it() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("A/B")).unwrap();
        fs::write(root.join("A/B/B1.txt"), b"B1\n").unwrap();
        fs::write(root.join("A/A1.txt"), b"A1\n").unwrap();

        History::load_from_path(&root.join("A/B"))
            .unwrap()
            .persist(crate::types::Generation {
                number: 1,
                creator_info: CreatorInfo::now(utils::local_host_name()),
                root_media_hash: MediaHash::new_directory(""),
                media_hashes: vec![],
            })
            .unwrap();

        let outcome = record(&root, &[root.join("A")], HashFormat::Xxh64).unwrap();
        assert!(!outcome.is_verification_failure());

        let history = History::load_from_path(&root).unwrap();
        let generation = &history.generations[0];
        // A/B is recorded as an ordinary path marker (no hash entries)...
        let b = generation.find_media_hash("A/B").unwrap();
        assert!(b.hash_entries().is_empty());
        // ...but its contents were never walked or hashed.
        assert!(generation.find_media_hash("A/B/B1.txt").is_none());
        // A/A1.txt, outside the nested history, is hashed normally.
        assert!(generation.find_media_hash("A/A1.txt").unwrap().hash_for(HashFormat::Xxh64).is_some());
    }
}
