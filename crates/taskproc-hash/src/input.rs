use camino::Utf8PathBuf;

/// One element of the ordered key list fed to the fingerprint hasher.
///
/// `Bag` models the order-insensitive collections the spec calls out
/// (unordered file sets): its elements are sorted by their own encoded
/// bytes before folding, so permutations of the same set always hash the
/// same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashInput {
    Bytes(Vec<u8>),
    Path {
        path: Utf8PathBuf,
        is_regular_file: bool,
    },
    Bag(Vec<HashInput>),
}

impl HashInput {
    pub fn str(s: impl Into<String>) -> Self {
        HashInput::Bytes(s.into().into_bytes())
    }

    pub fn bag(items: impl IntoIterator<Item = HashInput>) -> Self {
        HashInput::Bag(items.into_iter().collect())
    }
}
