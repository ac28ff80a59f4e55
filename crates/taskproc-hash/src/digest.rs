use std::fmt;

/// A 128-bit fingerprint, rendered as lowercase hex the way the teacher's
/// `TurboHash::hash` renders its 64-bit digest into a stack buffer rather
/// than allocating a `String` up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 16]);

impl Digest {
    pub fn from_u128(value: u128) -> Self {
        Digest(value.to_be_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        let mut buf = [0u8; 32];
        hex::encode_to_slice(self.0, &mut buf).expect("16-byte digest always fits a 32-byte hex buffer");
        std::str::from_utf8(&buf)
            .expect("hex encoding is always valid utf8")
            .to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
