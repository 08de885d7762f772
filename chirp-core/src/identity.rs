//! Group and host identity: MD5 fingerprints carried on the wire.

use std::fmt;

use md5::{Digest, Md5};

/// 16-byte MD5 digest. Used as a stable fingerprint of a group or host name,
/// not for security. Equality and ordering are lexicographic over the bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Md5Hash([u8; 16]);

impl Md5Hash {
    /// Hash a byte string. Deterministic across hosts.
    pub fn of(data: impl AsRef<[u8]>) -> Self {
        let mut hasher = Md5::new();
        hasher.update(data.as_ref());
        Self(hasher.finalize().into())
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Md5Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Md5Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Md5Hash({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests() {
        // Reference vectors from RFC 1321.
        assert_eq!(
            Md5Hash::of("").to_string(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            Md5Hash::of("abc").to_string(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn deterministic_and_distinct() {
        assert_eq!(Md5Hash::of("group"), Md5Hash::of("group"));
        assert_ne!(Md5Hash::of("group"), Md5Hash::of("Group"));
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = Md5Hash::from_bytes([0; 16]);
        let mut high = [0u8; 16];
        high[0] = 1;
        let b = Md5Hash::from_bytes(high);
        assert!(a < b);
    }

    #[test]
    fn roundtrip_bytes() {
        let h = Md5Hash::of("roundtrip");
        assert_eq!(Md5Hash::from_bytes(*h.as_bytes()), h);
    }
}
