use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use sha1collisiondetection::Sha1CD;
use sha1collisiondetection::Digest as Sha1Digest;
use xxhash_rust::xxh64::Xxh64;

use crate::error::MhlError;

const READ_CHUNK: usize = 64 * 1024;

/// One of the hash algorithms this engine supports, per the closed set the
/// ASC MHL convention recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashFormat {
    Xxh64,
    Md5,
    Sha1,
}

impl HashFormat {
    pub const ALL: [HashFormat; 3] = [HashFormat::Xxh64, HashFormat::Md5, HashFormat::Sha1];

    pub fn as_tag(self) -> &'static str {
        match self {
            HashFormat::Xxh64 => "xxh64",
            HashFormat::Md5 => "md5",
            HashFormat::Sha1 => "sha1",
        }
    }

    /// Width of the canonical hex representation, in characters.
    pub fn hex_width(self) -> usize {
        match self {
            HashFormat::Xxh64 => 16,
            HashFormat::Md5 => 32,
            HashFormat::Sha1 => 40,
        }
    }
}

impl fmt::Display for HashFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for HashFormat {
    type Err = MhlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "xxh64" => Ok(HashFormat::Xxh64),
            "md5" => Ok(HashFormat::Md5),
            "sha1" => Ok(HashFormat::Sha1),
            other => Err(MhlError::UnsupportedFormat(other.to_owned())),
        }
    }
}

/// A streaming accumulator for one of the supported hash algorithms. Used
/// both to hash a file's contents and, via [`DirectoryHashContext`], to hash
/// the canonical serialization of a directory's children.
enum Accumulator {
    Xxh64(Xxh64),
    Md5(Md5),
    Sha1(Sha1CD),
}

impl Accumulator {
    fn new(format: HashFormat) -> Self {
        match format {
            HashFormat::Xxh64 => Accumulator::Xxh64(Xxh64::new(0)),
            HashFormat::Md5 => Accumulator::Md5(Md5::default()),
            HashFormat::Sha1 => Accumulator::Sha1(Sha1CD::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Accumulator::Xxh64(h) => h.update(bytes),
            Accumulator::Md5(h) => {
                use md5::Digest;
                h.update(bytes)
            }
            Accumulator::Sha1(h) => h.update(bytes),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Accumulator::Xxh64(h) => format!("{:016x}", h.digest()),
            Accumulator::Md5(h) => {
                use md5::Digest;
                hex::encode(h.finalize())
            }
            Accumulator::Sha1(h) => hex::encode(h.finalize()),
        }
    }
}

/// Streams a file's contents once and returns the canonical lowercase hex
/// digest for `format`.
pub fn file_hash(format: HashFormat, path: &Path) -> Result<String, MhlError> {
    let mut file = File::open(path).map_err(|source| MhlError::IoFailure {
        path: path.to_path_buf(),
        source,
    })?;
    let mut acc = Accumulator::new(format);
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = read_fully(&mut file, &mut buf).map_err(|source| MhlError::IoFailure {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        acc.update(&buf[..n]);
    }
    Ok(acc.finalize_hex())
}

/// Hashes an in-memory byte slice, e.g. a manifest file's serialized bytes
/// before it's linked into the chain file.
pub fn hash_bytes(format: HashFormat, bytes: &[u8]) -> String {
    let mut acc = Accumulator::new(format);
    acc.update(bytes);
    acc.finalize_hex()
}

fn read_fully(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    file.read(buf)
}

/// Accumulates the canonical serialization of a directory's immediate
/// children and produces that directory's hash.
///
/// Children **must** be appended in lexicographic order of `child_name`;
/// this is enforced here rather than trusted from the caller, per the
/// ordering invariant the directory-hash algorithm depends on.
pub struct DirectoryHashContext {
    acc: Accumulator,
    previous_name: Option<String>,
}

impl DirectoryHashContext {
    pub fn new(format: HashFormat) -> Self {
        Self {
            acc: Accumulator::new(format),
            previous_name: None,
        }
    }

    /// Feeds one child into the context: the raw UTF-8 bytes of its name
    /// followed by the raw (binary-decoded) bytes of its canonical hash
    /// value, with no delimiter between them.
    pub fn append(&mut self, child_hash_value: &str, child_name: &str) -> Result<(), MhlError> {
        if let Some(previous) = &self.previous_name {
            if child_name.as_bytes() <= previous.as_bytes() {
                return Err(MhlError::OutOfOrderAppend {
                    previous: previous.clone(),
                    got: child_name.to_owned(),
                });
            }
        }
        let digest = hex::decode(child_hash_value)
            .map_err(|source| MhlError::InvalidHashEncoding(child_hash_value.to_owned(), source))?;
        self.acc.update(child_name.as_bytes());
        self.acc.update(&digest);
        self.previous_name = Some(child_name.to_owned());
        Ok(())
    }

    pub fn finalize(self) -> String {
        self.acc.finalize_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_format_roundtrip() {
        for f in HashFormat::ALL {
            assert_eq!(f.as_tag().parse::<HashFormat>().unwrap(), f);
        }
    }

    #[test]
    fn hex_width_matches_digest_size() {
        assert_eq!(HashFormat::Xxh64.hex_width(), 16);
        assert_eq!(HashFormat::Md5.hex_width(), 32);
        assert_eq!(HashFormat::Sha1.hex_width(), 40);
    }

    #[test]
    fn empty_directory_is_known_constant_xxh64() {
        let ctx = DirectoryHashContext::new(HashFormat::Xxh64);
        assert_eq!(ctx.finalize(), "ef46db3751d8e999");
    }

    #[test]
    fn directory_hash_rejects_out_of_order_append() {
        let mut ctx = DirectoryHashContext::new(HashFormat::Xxh64);
        ctx.append("abcdef1234567890", "b.txt").unwrap();
        let err = ctx.append("1234567890abcdef", "a.txt").unwrap_err();
        assert!(matches!(err, MhlError::OutOfOrderAppend { .. }));
    }

    #[test]
    fn directory_hash_rejects_duplicate_name() {
        let mut ctx = DirectoryHashContext::new(HashFormat::Xxh64);
        ctx.append("abcdef1234567890", "a.txt").unwrap();
        let err = ctx.append("1234567890abcdef", "a.txt").unwrap_err();
        assert!(matches!(err, MhlError::OutOfOrderAppend { .. }));
    }

    #[test]
    fn directory_hash_rejects_non_hex_value() {
        let mut ctx = DirectoryHashContext::new(HashFormat::Xxh64);
        let err = ctx.append("not-hex", "a.txt").unwrap_err();
        assert!(matches!(err, MhlError::InvalidHashEncoding(_, _)));
    }

    #[test]
    fn directory_hash_depends_on_child_names_not_just_hashes() {
        let mut a = DirectoryHashContext::new(HashFormat::Xxh64);
        a.append("ef46db3751d8e999", "emptyFolderA").unwrap();
        let mut b = DirectoryHashContext::new(HashFormat::Xxh64);
        b.append("ef46db3751d8e999", "emptyFolderB").unwrap();
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn file_hash_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"stuff\n").unwrap();
        let a = file_hash(HashFormat::Xxh64, &path).unwrap();
        let b = file_hash(HashFormat::Xxh64, &path).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), HashFormat::Xxh64.hex_width());
    }

    #[test]
    fn unsupported_format_is_rejected() {
        let err = "sha256".parse::<HashFormat>().unwrap_err();
        assert!(matches!(err, MhlError::UnsupportedFormat(_)));
    }
}
