//! The append-only `chain.txt` ledger linking a history's generations.
//!
//! The chain file is updated atomically: we open it in append mode, write
//! one line, then `fsync`. A crash before the `fsync` leaves the file
//! exactly as it was (the OS either commits the whole `write(2)` or none of
//! it for an append under typical POSIX semantics at this size), so a
//! partial write never corrupts or truncates the prior generation's entry.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::error::MhlError;

pub const CHAIN_FILE_NAME: &str = "chain.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub generation_number: u32,
    pub manifest_file_name: String,
    /// xxh64 hash (hex) of the manifest file's bytes, linking this entry to
    /// the exact manifest content it was written for.
    pub manifest_hash: String,
}

impl ChainEntry {
    fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\n",
            self.generation_number, self.manifest_file_name, self.manifest_hash
        )
    }

    fn parse_line(line: &str) -> Option<ChainEntry> {
        let mut parts = line.splitn(3, '\t');
        let generation_number = parts.next()?.parse().ok()?;
        let manifest_file_name = parts.next()?.to_owned();
        let manifest_hash = parts.next()?.trim_end().to_owned();
        Some(ChainEntry {
            generation_number,
            manifest_file_name,
            manifest_hash,
        })
    }
}

pub fn append(chain_path: &Path, entry: &ChainEntry) -> Result<(), MhlError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(chain_path)
        .map_err(|source| MhlError::IoFailure {
            path: chain_path.to_path_buf(),
            source,
        })?;
    file.write_all(entry.to_line().as_bytes())
        .map_err(|source| MhlError::IoFailure {
            path: chain_path.to_path_buf(),
            source,
        })?;
    file.sync_all().map_err(|source| MhlError::IoFailure {
        path: chain_path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub fn read_all(chain_path: &Path) -> Result<Vec<ChainEntry>, MhlError> {
    if !chain_path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(chain_path).map_err(|source| MhlError::IoFailure {
        path: chain_path.to_path_buf(),
        source,
    })?;
    let reader = io::BufReader::new(file);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|source| MhlError::IoFailure {
            path: chain_path.to_path_buf(),
            source,
        })?;
        if let Some(entry) = ChainEntry::parse_line(&line) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let chain_path = dir.path().join(CHAIN_FILE_NAME);

        append(
            &chain_path,
            &ChainEntry {
                generation_number: 1,
                manifest_file_name: "root_2020-01-16_091500_0001.mhl".to_owned(),
                manifest_hash: "deadbeefcafef00d".to_owned(),
            },
        )
        .unwrap();
        append(
            &chain_path,
            &ChainEntry {
                generation_number: 2,
                manifest_file_name: "root_2020-01-16_091600_0002.mhl".to_owned(),
                manifest_hash: "0123456789abcdef".to_owned(),
            },
        )
        .unwrap();

        let entries = read_all(&chain_path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].generation_number, 1);
        assert_eq!(entries[1].generation_number, 2);
    }

    #[test]
    fn reading_missing_chain_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries = read_all(&dir.path().join(CHAIN_FILE_NAME)).unwrap();
        assert!(entries.is_empty());
    }
}
