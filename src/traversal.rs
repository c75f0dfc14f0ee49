use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MhlError;

/// One immediate child of a directory as seen by [`walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    pub name: String,
    pub is_directory: bool,
}

/// Visits every directory under `root` (inclusive) in **post-order**, with
/// each directory's immediate children sorted lexicographically by name.
/// Post-order guarantees that when a directory is visited, every child
/// directory has already been visited — the precondition directory-hash
/// composition depends on.
///
/// `history_dir_name` (typically `"ascmhl"`) is skipped wherever it's found:
/// it holds this tool's own bookkeeping, not tree content.
///
/// `nested_roots` are absolute paths of nested histories' roots: their
/// subtree belongs to the nested history, not this traversal, so they
/// appear as an ordinary directory child of their parent but are never
/// descended into or yielded as their own `(dir, children)` entry.
///
/// Symlinks are never followed: this engine doesn't record symlinks as
/// first-class entries, so they're simply left untouched rather than
/// descended into or hashed as their target's content.
pub fn post_order_lexicographic(
    root: &Path,
    history_dir_name: &str,
    nested_roots: &HashSet<PathBuf>,
) -> Result<Vec<(PathBuf, Vec<Child>)>, MhlError> {
    let mut out = Vec::new();
    walk(root, history_dir_name, nested_roots, &mut out)?;
    Ok(out)
}

fn walk(
    dir: &Path,
    history_dir_name: &str,
    nested_roots: &HashSet<PathBuf>,
    out: &mut Vec<(PathBuf, Vec<Child>)>,
) -> Result<(), MhlError> {
    let mut children = Vec::new();
    for entry in fs::read_dir(dir).map_err(|source| MhlError::IoFailure {
        path: dir.to_path_buf(),
        source,
    })? {
        let entry = entry.map_err(|source| MhlError::IoFailure {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == history_dir_name {
            continue;
        }
        let file_type = entry.file_type().map_err(|source| MhlError::IoFailure {
            path: entry.path(),
            source,
        })?;
        if file_type.is_symlink() {
            continue;
        }
        children.push((name, file_type.is_dir()));
    }
    children.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, is_dir) in &children {
        if *is_dir && !nested_roots.contains(&dir.join(name)) {
            walk(&dir.join(name), history_dir_name, nested_roots, out)?;
        }
    }

    let tagged = children
        .into_iter()
        .map(|(name, is_directory)| Child { name, is_directory })
        .collect();
    out.push((dir.to_path_buf(), tagged));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(root: &Path, rel: &str) {
        fs::create_dir_all(root.join(rel)).unwrap();
    }

    #[test]
    fn post_order_visits_children_before_parent() {
        let dir = tempfile::tempdir().unwrap();
        mk(dir.path(), "A/AA");
        fs::write(dir.path().join("A/AA/AA1.txt"), b"x").unwrap();
        fs::write(dir.path().join("Stuff.txt"), b"y").unwrap();

        let visits = post_order_lexicographic(dir.path(), "ascmhl", &HashSet::new()).unwrap();
        let positions: Vec<&Path> = visits.iter().map(|(p, _)| p.as_path()).collect();
        let aa_pos = positions
            .iter()
            .position(|p| *p == dir.path().join("A/AA"))
            .unwrap();
        let a_pos = positions
            .iter()
            .position(|p| *p == dir.path().join("A"))
            .unwrap();
        let root_pos = positions.iter().position(|p| *p == dir.path()).unwrap();
        assert!(aa_pos < a_pos);
        assert!(a_pos < root_pos);
    }

    #[test]
    fn children_are_lexicographically_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), b"").unwrap();
        fs::write(dir.path().join("a.txt"), b"").unwrap();
        fs::write(dir.path().join("c.txt"), b"").unwrap();

        let visits = post_order_lexicographic(dir.path(), "ascmhl", &HashSet::new()).unwrap();
        let (_, children) = visits.iter().find(|(p, _)| *p == dir.path()).unwrap();
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn history_dir_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        mk(dir.path(), "ascmhl");
        fs::write(dir.path().join("Stuff.txt"), b"x").unwrap();

        let visits = post_order_lexicographic(dir.path(), "ascmhl", &HashSet::new()).unwrap();
        let (_, children) = visits.iter().find(|(p, _)| *p == dir.path()).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "Stuff.txt");
    }

    #[test]
    fn nested_root_is_not_descended_into() {
        let dir = tempfile::tempdir().unwrap();
        mk(dir.path(), "B");
        fs::write(dir.path().join("B/B1.txt"), b"x").unwrap();
        fs::write(dir.path().join("Stuff.txt"), b"y").unwrap();

        let mut nested_roots = HashSet::new();
        nested_roots.insert(dir.path().join("B"));

        let visits = post_order_lexicographic(dir.path(), "ascmhl", &nested_roots).unwrap();
        assert!(!visits.iter().any(|(p, _)| *p == dir.path().join("B")));
        let (_, root_children) = visits.iter().find(|(p, _)| *p == dir.path()).unwrap();
        let names: Vec<&str> = root_children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["B", "Stuff.txt"]);
    }
}
