use std::fs;

use taskproc_types::HashingMode;
use xxhash_rust::xxh3::xxh3_128;

use crate::digest::Digest;
use crate::error::HashError;
use crate::input::HashInput;

/// Computes fingerprints over an ordered key list, folding bags in an
/// order-insensitive way and reading file content when the mode calls
/// for it. Grounded on `turborepo-hash/src/traits.rs`'s `TurboHash` and
/// on the sort-before-hash idiom in `turborepo-lib/src/hash/mod.rs`.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintHasher {
    mode: HashingMode,
}

impl FingerprintHasher {
    pub fn new(mode: HashingMode) -> Self {
        Self { mode }
    }

    /// Hash an ordered list of keys into a single 128-bit digest. The
    /// top-level list is order-sensitive; nested `HashInput::Bag`s are
    /// not.
    pub fn hash(&self, keys: &[HashInput]) -> Result<Digest, HashError> {
        let mut buf = Vec::new();
        for key in keys {
            let encoded = self.encode(key)?;
            buf.extend_from_slice(&(encoded.len() as u64).to_le_bytes());
            buf.extend_from_slice(&encoded);
        }
        Ok(Digest::from_u128(xxh3_128(&buf)))
    }

    /// Re-hash a prior fingerprint together with a retry attempt index,
    /// so each attempt gets a distinct work directory even though the
    /// underlying task inputs did not change.
    pub fn rehash(&self, prev: Digest, attempt: u32) -> Digest {
        let mut buf = Vec::with_capacity(16 + 4);
        buf.extend_from_slice(prev.as_bytes());
        buf.extend_from_slice(&attempt.to_le_bytes());
        Digest::from_u128(xxh3_128(&buf))
    }

    fn encode(&self, input: &HashInput) -> Result<Vec<u8>, HashError> {
        match input {
            HashInput::Bytes(bytes) => Ok(bytes.clone()),
            HashInput::Path { path, is_regular_file } => self.encode_path(path, *is_regular_file),
            HashInput::Bag(items) => {
                let mut encoded: Vec<Vec<u8>> = items
                    .iter()
                    .map(|item| self.encode(item))
                    .collect::<Result<_, _>>()?;
                encoded.sort();
                let mut buf = Vec::new();
                for item in encoded {
                    buf.extend_from_slice(&(item.len() as u64).to_le_bytes());
                    buf.extend_from_slice(&item);
                }
                Ok(buf)
            }
        }
    }

    fn encode_path(
        &self,
        path: &camino::Utf8Path,
        is_regular_file: bool,
    ) -> Result<Vec<u8>, HashError> {
        match self.mode {
            HashingMode::Lenient => {
                let size = fs::metadata(path)
                    .map(|m| m.len())
                    .map_err(|source| HashError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                let mut buf = path.as_str().as_bytes().to_vec();
                buf.extend_from_slice(&size.to_le_bytes());
                Ok(buf)
            }
            HashingMode::Standard => {
                if is_regular_file {
                    fs::read(path).map_err(|source| HashError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                } else {
                    Ok(path.as_str().as_bytes().to_vec())
                }
            }
            HashingMode::Deep => {
                let mut buf = if is_regular_file {
                    fs::read(path).map_err(|source| HashError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?
                } else {
                    Vec::new()
                };
                if let Ok(target) = fs::read_link(path) {
                    buf.extend_from_slice(target.to_string_lossy().as_bytes());
                }
                if path.is_dir() {
                    let mut names: Vec<String> = fs::read_dir(path)
                        .map_err(|source| HashError::Io {
                            path: path.to_path_buf(),
                            source,
                        })?
                        .filter_map(|entry| entry.ok())
                        .map(|entry| entry.file_name().to_string_lossy().into_owned())
                        .collect();
                    names.sort();
                    for name in names {
                        buf.extend_from_slice(name.as_bytes());
                    }
                }
                Ok(buf)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::HashInput;
    use std::io::Write;

    #[test]
    fn same_keys_hash_identically() {
        let hasher = FingerprintHasher::new(HashingMode::Standard);
        let keys = vec![HashInput::str("proc"), HashInput::str("value=1")];
        assert_eq!(hasher.hash(&keys).unwrap(), hasher.hash(&keys).unwrap());
    }

    #[test]
    fn different_attempts_rehash_differently() {
        let hasher = FingerprintHasher::new(HashingMode::Standard);
        let base = hasher.hash(&[HashInput::str("proc")]).unwrap();
        let a1 = hasher.rehash(base, 1);
        let a2 = hasher.rehash(base, 2);
        assert_ne!(a1, a2);
    }

    #[test]
    fn bag_order_does_not_affect_hash() {
        let hasher = FingerprintHasher::new(HashingMode::Standard);
        let a = HashInput::bag(vec![HashInput::str("x"), HashInput::str("y")]);
        let b = HashInput::bag(vec![HashInput::str("y"), HashInput::str("x")]);
        assert_eq!(hasher.hash(&[a]).unwrap(), hasher.hash(&[b]).unwrap());
    }

    #[test]
    fn lenient_mode_does_not_read_file_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hello").unwrap();
        let utf8_path = camino::Utf8PathBuf::from_path_buf(path.clone()).unwrap();

        let lenient = FingerprintHasher::new(HashingMode::Lenient);
        let h1 = lenient
            .hash(&[HashInput::Path {
                path: utf8_path.clone(),
                is_regular_file: true,
            }])
            .unwrap();

        std::fs::File::create(&path).unwrap().write_all(b"hello").unwrap();
        let h2 = lenient
            .hash(&[HashInput::Path {
                path: utf8_path,
                is_regular_file: true,
            }])
            .unwrap();

        assert_eq!(h1, h2, "lenient mode keys only on path and size");
    }
}
