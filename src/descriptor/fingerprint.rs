use super::error::DescriptorError;
use sha1::{Digest, Sha1};
use std::fmt;

/// Swarm-wide identity of a downloadable item: the SHA-1 digest of the
/// serialized info dictionary, byte for byte as transmitted.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    pub const LEN: usize = 20;

    /// Computes the fingerprint of a serialized info dictionary.
    pub fn of_info(info_bytes: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(info_bytes);
        Fingerprint(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DescriptorError> {
        if bytes.len() != Self::LEN {
            return Err(DescriptorError::BadFingerprintLength(bytes.len()));
        }
        let mut digest = [0u8; Self::LEN];
        digest.copy_from_slice(bytes);
        Ok(Fingerprint(digest))
    }

    pub fn from_hex(hex: &str) -> Result<Self, DescriptorError> {
        if hex.len() != Self::LEN * 2 || !hex.is_ascii() {
            return Err(DescriptorError::InvalidField("fingerprint hex"));
        }
        let mut digest = [0u8; Self::LEN];
        for (i, byte) in digest.iter_mut().enumerate() {
            let pair = &hex[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| DescriptorError::InvalidField("fingerprint hex"))?;
        }
        Ok(Fingerprint(digest))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(Self::LEN * 2);
        for byte in self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}
