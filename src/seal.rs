//! The Seal Engine: orchestrates traversal, hashing, history lookup and
//! directory-hash composition into one new generation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MhlError;
use crate::hash::{self, DirectoryHashContext, HashFormat};
use crate::history::{self, History};
use crate::session::GenerationSession;
use crate::traversal;
use crate::types::{CreatorInfo, MediaHash};
use crate::utils;

/// Everything the CLI needs to report an outcome and pick an exit code.
#[derive(Debug, Default)]
pub struct SealOutcome {
    pub generation_number: u32,
    /// Display-form absolute paths whose computed hash disagreed with a
    /// recorded one.
    pub mismatched_paths: Vec<String>,
    /// Display-form absolute paths recorded in history but absent from the
    /// filesystem by the end of the traversal.
    pub missing_paths: Vec<String>,
    /// Paths that could not be read, with the underlying error message.
    /// Counted as verification failures, the same as a mismatched hash.
    pub io_failures: Vec<(String, String)>,
}

impl SealOutcome {
    pub fn is_verification_failure(&self) -> bool {
        !self.mismatched_paths.is_empty() || !self.io_failures.is_empty()
    }

    pub fn is_completeness_failure(&self) -> bool {
        !self.missing_paths.is_empty()
    }
}

/// Seals `root`: loads its history, walks the tree, hashes every file (and,
/// if `compute_directory_hashes`, every directory), and commits a new
/// generation even when some files turn out missing or mismatched — the
/// generation is always committed before any failure is reported.
pub fn seal(
    root: &Path,
    format: HashFormat,
    compute_directory_hashes: bool,
) -> Result<SealOutcome, MhlError> {
    let mut history = History::load_from_path(root)?;
    let mut expected = history.set_of_expected_paths();
    let nested_roots: std::collections::HashSet<PathBuf> =
        history.nested.iter().map(|(_, h)| h.root.clone()).collect();
    let visits = traversal::post_order_lexicographic(root, history::HISTORY_DIR_NAME, &nested_roots)?;

    let mut session = GenerationSession::new(&history);
    let mut directory_hashes: HashMap<PathBuf, String> = HashMap::new();
    let mut mismatched_paths = Vec::new();
    let mut io_failures = Vec::new();

    for (dir, children) in &visits {
        let mut context = compute_directory_hashes.then(|| DirectoryHashContext::new(format));

        for child in children {
            let child_path = dir.join(&child.name);

            if child.is_directory {
                // A directory recorded by a prior `-d` seal is an expected
                // path just like a file; clear it here so an untouched
                // directory is never reported as missing, even on a run
                // that isn't itself computing directory hashes.
                expected.remove(&child_path);
                if nested_roots.contains(&child_path) {
                    // Its contents belong to the nested history and were
                    // never walked by us; record only the root path itself
                    // with no hash and no contribution to this directory's
                    // hash composition.
                    let relative = history.relative_path_string(&child_path);
                    session.append_nested_history_root(&relative);
                    continue;
                }
                if let Some(child_hash) = directory_hashes.remove(&child_path) {
                    if let Some(ctx) = context.as_mut() {
                        ctx.append(&child_hash, &child.name)?;
                    }
                }
                continue;
            }

            expected.remove(&child_path);
            let relative = history.relative_path_string(&child_path);
            match seal_file(&history, &mut session, &child_path, &relative, format) {
                Ok((ok, value)) => {
                    if !ok {
                        mismatched_paths.push(child_path.display().to_string());
                    }
                    if let Some(ctx) = context.as_mut() {
                        ctx.append(&value, &child.name)?;
                    }
                }
                Err(MhlError::IoFailure { path, source }) => {
                    io_failures.push((path.display().to_string(), source.to_string()));
                }
                Err(other) => return Err(other),
            }
        }

        if let Some(ctx) = context {
            let hash_value = ctx.finalize();
            directory_hashes.insert(dir.clone(), hash_value.clone());
            // The root directory's hash is carried on `root_media_hash`
            // separately, not as a path entry among `media_hashes`.
            if dir != root {
                let relative = history.relative_path_string(dir);
                let ok = session.append_directory_hash(&relative, format, hash_value);
                if !ok {
                    mismatched_paths.push(dir.display().to_string());
                }
            }
        }
    }

    let mut root_media_hash = MediaHash::new_directory("");
    if compute_directory_hashes {
        if let Some(hash_value) = directory_hashes.get(root) {
            root_media_hash.set_hash(format, hash_value.clone());
        }
    }

    let generation_number = history.next_generation_number();
    let creator_info = CreatorInfo::now(utils::local_host_name());
    let generation = session.commit(generation_number, creator_info, root_media_hash);
    history.persist(generation)?;

    let mut missing_paths: Vec<String> = expected.iter().map(|p| p.display().to_string()).collect();
    missing_paths.sort();

    Ok(SealOutcome {
        generation_number,
        mismatched_paths,
        missing_paths,
        io_failures,
    })
}

/// Hashes one file, applying the cross-format verification policy: if
/// `requested_format` isn't yet recorded for this path but some other
/// format is, also re-verify in the first format that history records
/// (first-encountered order — see DESIGN.md for why this tie-break was
/// chosen over an alphabetical one). Returns whether every append succeeded
/// and the value recorded in `requested_format`, which is what feeds the
/// enclosing directory's hash context.
pub(crate) fn seal_file(
    history: &History,
    session: &mut GenerationSession,
    absolute_path: &Path,
    relative_path: &str,
    requested_format: HashFormat,
) -> Result<(bool, String), MhlError> {
    let metadata = fs::metadata(absolute_path).map_err(|source| MhlError::IoFailure {
        path: absolute_path.to_path_buf(),
        source,
    })?;
    let size = metadata.len();
    let modified = metadata.modified().map_err(|source| MhlError::IoFailure {
        path: absolute_path.to_path_buf(),
        source,
    })?;
    let mtime = utils::system_time_isostring(modified);

    let (owning_history, owning_relative) = history.find_history_for(relative_path);
    let existing_formats = owning_history.existing_formats_for(&owning_relative);

    let mut success = true;
    if !existing_formats.is_empty() && !existing_formats.contains(&requested_format) {
        let verification_format = existing_formats[0];
        let verification_value = hash::file_hash(verification_format, absolute_path)?;
        success &= session.append_file_hash(
            relative_path,
            size,
            mtime.clone(),
            verification_format,
            verification_value,
        );
    }

    let requested_value = hash::file_hash(requested_format, absolute_path)?;
    success &= session.append_file_hash(relative_path, size, mtime, requested_format, requested_value.clone());

    Ok((success, requested_value))
}
