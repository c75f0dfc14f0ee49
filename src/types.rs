use crate::hash::HashFormat;

/// A single recorded `(format, value)` pair. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashEntry {
    pub format: HashFormat,
    pub value: String,
}

impl HashEntry {
    pub fn new(format: HashFormat, value: impl Into<String>) -> Self {
        Self {
            format,
            value: value.into(),
        }
    }
}

/// Record of one path's observed state within a single generation.
///
/// A [`MediaHash`] has at most one [`HashEntry`] per [`HashFormat`]: callers
/// are expected to use [`MediaHash::set_hash`] rather than pushing directly
/// to keep that invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHash {
    /// Path relative to the history root, using `/` separators.
    pub path: String,
    pub is_directory: bool,
    pub size: Option<u64>,
    /// ISO-8601 modification timestamp; files only.
    pub last_modification_date: Option<String>,
    hash_entries: Vec<HashEntry>,
}

impl MediaHash {
    pub fn new_file(path: impl Into<String>, size: u64, last_modification_date: String) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
            size: Some(size),
            last_modification_date: Some(last_modification_date),
            hash_entries: Vec::new(),
        }
    }

    pub fn new_directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
            size: None,
            last_modification_date: None,
            hash_entries: Vec::new(),
        }
    }

    pub fn hash_entries(&self) -> &[HashEntry] {
        &self.hash_entries
    }

    pub fn hash_for(&self, format: HashFormat) -> Option<&HashEntry> {
        self.hash_entries.iter().find(|e| e.format == format)
    }

    /// Records a hash for `format`, replacing any prior entry for the same
    /// format (within-generation uniqueness per path+format).
    pub fn set_hash(&mut self, format: HashFormat, value: impl Into<String>) {
        let value = value.into();
        if let Some(existing) = self.hash_entries.iter_mut().find(|e| e.format == format) {
            existing.value = value;
        } else {
            self.hash_entries.push(HashEntry::new(format, value));
        }
    }
}

/// The process kind recorded in [`CreatorInfo`]. The ASC MHL convention
/// allows other values in the wider ecosystem (e.g. transfers performed by
/// archival tools); this engine only ever produces `InPlace` generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    InPlace,
}

impl ProcessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::InPlace => "in-place",
        }
    }
}

/// Tool identity, host and timestamp recorded with every generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatorInfo {
    pub tool_name: String,
    pub tool_version: String,
    pub host_name: String,
    /// ISO-8601 creation timestamp.
    pub creation_date: String,
    pub process: ProcessKind,
}

impl CreatorInfo {
    pub fn now(host_name: String) -> Self {
        Self {
            tool_name: "ascmhl-rs".to_owned(),
            tool_version: env!("CARGO_PKG_VERSION").to_owned(),
            host_name,
            creation_date: crate::utils::datetime_now_isostring(),
            process: ProcessKind::InPlace,
        }
    }

    /// Build a [`CreatorInfo`] with an explicit timestamp, used by tests
    /// that need deterministic output instead of the wall clock.
    pub fn new_for_test(host_name: String, creation_date: String) -> Self {
        Self {
            tool_name: "ascmhl-rs".to_owned(),
            tool_version: env!("CARGO_PKG_VERSION").to_owned(),
            host_name,
            creation_date,
            process: ProcessKind::InPlace,
        }
    }
}

/// One immutable snapshot of file hashes for a tree.
#[derive(Debug, Clone)]
pub struct Generation {
    pub number: u32,
    pub creator_info: CreatorInfo,
    pub root_media_hash: MediaHash,
    pub media_hashes: Vec<MediaHash>,
}

impl Generation {
    pub fn find_media_hash(&self, path: &str) -> Option<&MediaHash> {
        self.media_hashes.iter().find(|m| m.path == path)
    }

    /// The absolute (root-relative) file path of this history, used when
    /// assembling the root [`MediaHash`].
    pub fn manifest_file_name(&self, root_basename: &str) -> String {
        format!(
            "{}_{}_{:04}.mhl",
            root_basename,
            self.creator_info.creation_date_for_filename(),
            self.number
        )
    }
}

impl CreatorInfo {
    /// Formats the creation date for use in a generation's manifest file
    /// name: `YYYY-MM-DD_HHMMSS`.
    pub fn creation_date_for_filename(&self) -> String {
        // creation_date is ISO-8601, e.g. "2020-01-16T09:15:00"
        let mut parts = self.creation_date.splitn(2, 'T');
        let date = parts.next().unwrap_or_default();
        let time = parts.next().unwrap_or_default();
        let time_compact: String = time.chars().filter(|c| c.is_ascii_digit()).collect();
        format!("{date}_{time_compact}")
    }
}
