//! The History Store: loads, queries and persists the chain of generations
//! rooted at one path, plus any nested histories found inside its
//! subdirectories.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::chain::{self, ChainEntry, CHAIN_FILE_NAME};
use crate::error::MhlError;
use crate::hash::{self, HashFormat};
use crate::manifest;
use crate::types::{Generation, HashEntry};

pub const HISTORY_DIR_NAME: &str = "ascmhl";

/// One history: an ordered chain of generations for `root`, plus any nested
/// histories this history's subtree owns.
#[derive(Debug, Clone)]
pub struct History {
    pub root: PathBuf,
    pub generations: Vec<Generation>,
    /// `(path relative to `root`, using `/` separators, nested History)`.
    pub nested: Vec<(String, History)>,
}

impl History {
    /// Scans `root` downward for history directories and builds the outer
    /// history plus any nested histories found inside subdirectories.
    pub fn load_from_path(root: &Path) -> Result<History, MhlError> {
        let history_dir = root.join(HISTORY_DIR_NAME);
        let generations = if history_dir.is_dir() {
            load_generations(&history_dir)?
        } else {
            Vec::new()
        };
        let nested = discover_nested(root, root)?;
        Ok(History {
            root: root.to_path_buf(),
            generations,
            nested,
        })
    }

    pub fn root_basename(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_owned())
    }

    pub fn history_dir(&self) -> PathBuf {
        self.root.join(HISTORY_DIR_NAME)
    }

    /// Converts an absolute filesystem path into this history's `/`-joined
    /// relative path representation.
    pub fn relative_path_string(&self, absolute: &Path) -> String {
        let rel = absolute.strip_prefix(&self.root).unwrap_or(absolute);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn absolute_path(&self, relative: &str) -> PathBuf {
        if relative.is_empty() {
            return self.root.clone();
        }
        let mut path = self.root.clone();
        for part in relative.split('/') {
            path.push(part);
        }
        path
    }

    /// The union, over every generation in this history and all nested
    /// histories, of every recorded file/directory path, made absolute.
    pub fn set_of_expected_paths(&self) -> HashSet<PathBuf> {
        let mut set = HashSet::new();
        for generation in &self.generations {
            for media_hash in &generation.media_hashes {
                set.insert(self.absolute_path(&media_hash.path));
            }
        }
        for (_, nested) in &self.nested {
            set.extend(nested.set_of_expected_paths());
        }
        set
    }

    /// Selects the most-specific (deepest) history whose root is an
    /// ancestor of `relative_path`, and returns it together with the path
    /// relative to *that* history.
    pub fn find_history_for(&self, relative_path: &str) -> (&History, String) {
        for (nested_root, nested_history) in &self.nested {
            let matches = relative_path == nested_root
                || relative_path.starts_with(&format!("{nested_root}/"));
            if matches {
                let remainder = if relative_path == nested_root {
                    String::new()
                } else {
                    relative_path[nested_root.len() + 1..].to_owned()
                };
                return nested_history.find_history_for(&remainder);
            }
        }
        (self, relative_path.to_owned())
    }

    /// The earliest recorded [`HashEntry`] for `relative_path` across this
    /// history's generations (oldest generation first); its format is the
    /// one verification should use.
    pub fn find_original_hash_entry(&self, relative_path: &str) -> Option<&HashEntry> {
        for generation in &self.generations {
            if let Some(media_hash) = generation.find_media_hash(relative_path) {
                if let Some(entry) = media_hash.hash_entries().first() {
                    return Some(entry);
                }
            }
        }
        None
    }

    /// The formats recorded for `relative_path` across all generations, in
    /// the order first encountered.
    pub fn existing_formats_for(&self, relative_path: &str) -> Vec<HashFormat> {
        let mut formats = Vec::new();
        for generation in &self.generations {
            if let Some(media_hash) = generation.find_media_hash(relative_path) {
                for entry in media_hash.hash_entries() {
                    if !formats.contains(&entry.format) {
                        formats.push(entry.format);
                    }
                }
            }
        }
        formats
    }

    pub fn next_generation_number(&self) -> u32 {
        self.generations.last().map(|g| g.number + 1).unwrap_or(1)
    }

    /// Writes `generation`'s manifest to a temp file, `fsync`s it, renames
    /// it into place, appends a chain entry, then records the generation
    /// in memory. Crash-safe: a failure before the rename leaves the
    /// previous generation (and chain file) untouched.
    pub fn persist(&mut self, generation: Generation) -> Result<(), MhlError> {
        let history_dir = self.history_dir();
        fs::create_dir_all(&history_dir).map_err(|source| MhlError::IoFailure {
            path: history_dir.clone(),
            source,
        })?;

        let file_name = generation.manifest_file_name(&self.root_basename());
        let manifest_path = history_dir.join(&file_name);
        let tmp_path = history_dir.join(format!(".{file_name}.tmp"));
        let xml = manifest::write_generation(&generation);

        {
            let mut tmp = File::create(&tmp_path).map_err(|source| MhlError::IoFailure {
                path: tmp_path.clone(),
                source,
            })?;
            tmp.write_all(&xml).map_err(|source| MhlError::IoFailure {
                path: tmp_path.clone(),
                source,
            })?;
            tmp.sync_all().map_err(|source| MhlError::IoFailure {
                path: tmp_path.clone(),
                source,
            })?;
        }
        fs::rename(&tmp_path, &manifest_path).map_err(|source| MhlError::IoFailure {
            path: manifest_path.clone(),
            source,
        })?;

        let manifest_hash = hash::hash_bytes(HashFormat::Xxh64, &xml);
        chain::append(
            &history_dir.join(CHAIN_FILE_NAME),
            &ChainEntry {
                generation_number: generation.number,
                manifest_file_name: file_name,
                manifest_hash,
            },
        )?;

        self.generations.push(generation);
        Ok(())
    }
}

fn load_generations(history_dir: &Path) -> Result<Vec<Generation>, MhlError> {
    let entries = chain::read_all(&history_dir.join(CHAIN_FILE_NAME))?;
    let mut generations = Vec::with_capacity(entries.len());
    for entry in entries {
        let manifest_path = history_dir.join(&entry.manifest_file_name);
        let bytes = fs::read(&manifest_path).map_err(|source| MhlError::IoFailure {
            path: manifest_path.clone(),
            source,
        })?;
        let generation = manifest::parse_generation(&manifest_path, &bytes)?;
        generations.push(generation);
    }
    generations.sort_by_key(|g| g.number);
    Ok(generations)
}

/// Finds every directory under `history_root` (excluding `history_root`
/// itself) that owns an `ascmhl` subdirectory, and loads each as a nested
/// [`History`]. Descent stops at a nested history's own root: its subtree
/// belongs to it, not to the caller.
fn discover_nested(dir: &Path, history_root: &Path) -> Result<Vec<(String, History)>, MhlError> {
    let mut nested = Vec::new();
    for entry in fs::read_dir(dir).map_err(|source| MhlError::IoFailure {
        path: dir.to_path_buf(),
        source,
    })? {
        let entry = entry.map_err(|source| MhlError::IoFailure {
            path: dir.to_path_buf(),
            source,
        })?;
        let file_type = entry.file_type().map_err(|source| MhlError::IoFailure {
            path: entry.path(),
            source,
        })?;
        if !file_type.is_dir() {
            continue;
        }
        let path = entry.path();
        if entry.file_name() == HISTORY_DIR_NAME {
            continue;
        }
        if path != history_root && path.join(HISTORY_DIR_NAME).is_dir() {
            let relative = path
                .strip_prefix(history_root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let nested_history = History::load_from_path(&path)?;
            nested.push((relative, nested_history));
        } else {
            nested.extend(discover_nested(&path, history_root)?);
        }
    }
    Ok(nested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CreatorInfo, MediaHash};

    fn sample_generation(number: u32, host: &str) -> Generation {
        let mut root = MediaHash::new_directory("");
        root.set_hash(HashFormat::Xxh64, "deadbeef00000000");
        let mut file = MediaHash::new_file("Stuff.txt", 6, "2020-01-16T09:15:00".to_owned());
        file.set_hash(HashFormat::Xxh64, "abc123");
        Generation {
            number,
            creator_info: CreatorInfo::new_for_test(host.to_owned(), "2020-01-16T09:15:00".to_owned()),
            root_media_hash: root,
            media_hashes: vec![file],
        }
    }

    #[test]
    fn persist_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();

        let mut history = History::load_from_path(&root).unwrap();
        assert!(history.generations.is_empty());
        assert_eq!(history.next_generation_number(), 1);

        history.persist(sample_generation(1, "test-host")).unwrap();
        assert!(root.join("ascmhl/chain.txt").exists());

        let reloaded = History::load_from_path(&root).unwrap();
        assert_eq!(reloaded.generations.len(), 1);
        assert_eq!(reloaded.generations[0].number, 1);
        assert_eq!(reloaded.next_generation_number(), 2);
    }

    #[test]
    fn commit_through_failure_is_still_reloadable() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();

        let mut history = History::load_from_path(&root).unwrap();
        history.persist(sample_generation(1, "host")).unwrap();
        history.persist(sample_generation(2, "host")).unwrap();

        let reloaded = History::load_from_path(&root).unwrap();
        assert_eq!(reloaded.generations.len(), 2);
        assert_eq!(reloaded.generations[1].number, 2);
    }

    #[test]
    fn nested_history_is_discovered_and_owns_its_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let nested_root = root.join("B");
        fs::create_dir_all(&nested_root).unwrap();

        let mut nested = History::load_from_path(&nested_root).unwrap();
        nested.persist(sample_generation(1, "host")).unwrap();

        let outer = History::load_from_path(&root).unwrap();
        assert_eq!(outer.nested.len(), 1);
        assert_eq!(outer.nested[0].0, "B");
    }

    #[test]
    fn find_history_for_selects_deepest_match() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let nested_root = root.join("B");
        fs::create_dir_all(&nested_root).unwrap();
        History::load_from_path(&nested_root)
            .unwrap()
            .persist(sample_generation(1, "host"))
            .unwrap();

        let outer = History::load_from_path(&root).unwrap();
        let (found, relative) = outer.find_history_for("B/B1.txt");
        assert_eq!(found.root, nested_root);
        assert_eq!(relative, "B1.txt");

        let (found, relative) = outer.find_history_for("Stuff.txt");
        assert_eq!(found.root, root);
        assert_eq!(relative, "Stuff.txt");
    }
}
