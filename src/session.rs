//! The Generation Session: accumulates one generation's worth of
//! observations and reconciles each against the existing history.

use crate::hash::HashFormat;
use crate::history::History;
use crate::types::{CreatorInfo, Generation, MediaHash};

/// Accumulates observations for one in-progress generation. Holds a
/// read-only borrow of the existing history for the duration of the seal,
/// check or record run; [`GenerationSession::commit`] hands back the
/// assembled [`Generation`] for the caller to persist once the session (and
/// its borrow of the history) has been dropped.
pub struct GenerationSession<'h> {
    history: &'h History,
    media_hashes: Vec<MediaHash>,
    mismatched_paths: Vec<String>,
}

impl<'h> GenerationSession<'h> {
    pub fn new(history: &'h History) -> Self {
        Self {
            history,
            media_hashes: Vec::new(),
            mismatched_paths: Vec::new(),
        }
    }

    /// Records one file observation.
    ///
    /// Returns `true` if either no prior hash exists in `format` for this
    /// path, or the prior hash matches `value`. Returns `false` on
    /// mismatch — the observation is retained regardless, so the generation
    /// still records reality.
    pub fn append_file_hash(
        &mut self,
        relative_path: &str,
        size: u64,
        last_modification_date: String,
        format: HashFormat,
        value: String,
    ) -> bool {
        let success = self.verify_against_history(relative_path, format, &value);
        self.record(relative_path, format, value, |path| {
            MediaHash::new_file(path, size, last_modification_date.clone())
        });
        if !success {
            self.mismatched_paths.push(relative_path.to_owned());
        }
        success
    }

    /// Records one directory observation. Mismatches against a prior
    /// directory hash are reported identically to file mismatches.
    pub fn append_directory_hash(&mut self, relative_path: &str, format: HashFormat, value: String) -> bool {
        let success = self.verify_against_history(relative_path, format, &value);
        self.record(relative_path, format, value, MediaHash::new_directory);
        if !success {
            self.mismatched_paths.push(relative_path.to_owned());
        }
        success
    }

    fn verify_against_history(&self, relative_path: &str, format: HashFormat, value: &str) -> bool {
        let (owning_history, owning_relative) = self.history.find_history_for(relative_path);
        match owning_history.existing_hash_entry(&owning_relative, format) {
            Some(prior) => prior.value == value,
            None => true,
        }
    }

    fn record(
        &mut self,
        relative_path: &str,
        format: HashFormat,
        value: String,
        make: impl FnOnce(String) -> MediaHash,
    ) {
        if let Some(existing) = self.media_hashes.iter_mut().find(|m| m.path == relative_path) {
            existing.set_hash(format, value);
        } else {
            let mut media_hash = make(relative_path.to_owned());
            media_hash.set_hash(format, value);
            self.media_hashes.push(media_hash);
        }
    }

    /// Records a nested history's root as an ordinary path: no hash
    /// entries, just a marker that this directory exists and is owned by a
    /// nested history the outer traversal doesn't re-hash. Not subject to
    /// mismatch verification since there's no hash to compare.
    pub fn append_nested_history_root(&mut self, relative_path: &str) {
        if self.media_hashes.iter().any(|m| m.path == relative_path) {
            return;
        }
        self.media_hashes.push(MediaHash::new_directory(relative_path.to_owned()));
    }

    /// Paths that failed verification so far.
    pub fn mismatched_paths(&self) -> &[String] {
        &self.mismatched_paths
    }

    /// Assembles the generation from everything observed so far. The caller
    /// is responsible for persisting it via [`History::persist`] — this
    /// method only builds the value, since `self` still borrows `history`
    /// immutably and a mutable `persist` call can't happen until that
    /// borrow ends.
    pub fn commit(self, generation_number: u32, creator_info: CreatorInfo, root_media_hash: MediaHash) -> Generation {
        Generation {
            number: generation_number,
            creator_info,
            root_media_hash,
            media_hashes: self.media_hashes,
        }
    }
}

impl History {
    /// The most recently recorded [`crate::types::HashEntry`] for
    /// `relative_path` in `format`, scanning generations newest-first —
    /// later generations override prior observations on load, even though
    /// the originals remain in earlier generations.
    pub fn existing_hash_entry(
        &self,
        relative_path: &str,
        format: HashFormat,
    ) -> Option<&crate::types::HashEntry> {
        for generation in self.generations.iter().rev() {
            if let Some(media_hash) = generation.find_media_hash(relative_path) {
                if let Some(entry) = media_hash.hash_for(format) {
                    return Some(entry);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn empty_history() -> History {
        History {
            root: PathBuf::from("/root"),
            generations: Vec::new(),
            nested: Vec::new(),
        }
    }

    #[test]
    fn new_file_hash_is_accepted() {
        let history = empty_history();
        let mut session = GenerationSession::new(&history);
        let ok = session.append_file_hash(
            "Stuff.txt",
            6,
            "2020-01-16T09:15:00".to_owned(),
            HashFormat::Xxh64,
            "abc123".to_owned(),
        );
        assert!(ok);
        assert!(session.mismatched_paths().is_empty());
    }

    #[test]
    fn mismatch_is_still_recorded() {
        let mut history = empty_history();
        history.persist(crate::types::Generation {
            number: 1,
            creator_info: crate::types::CreatorInfo::new_for_test(
                "host".to_owned(),
                "2020-01-16T09:15:00".to_owned(),
            ),
            root_media_hash: MediaHash::new_directory(""),
            media_hashes: vec![{
                let mut mh = MediaHash::new_file("Stuff.txt", 6, "2020-01-16T09:15:00".to_owned());
                mh.set_hash(HashFormat::Xxh64, "original");
                mh
            }],
        })
        .unwrap();

        let mut session = GenerationSession::new(&history);
        let ok = session.append_file_hash(
            "Stuff.txt",
            8,
            "2020-01-16T09:16:00".to_owned(),
            HashFormat::Xxh64,
            "changed".to_owned(),
        );
        assert!(!ok);
        assert_eq!(session.mismatched_paths(), ["Stuff.txt"]);
    }
}
