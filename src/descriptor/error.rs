use crate::bencode::BencodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    #[error("fingerprint must be 20 bytes, got {0}")]
    BadFingerprintLength(usize),

    #[error("{hashes} piece hashes cannot cover {total} bytes")]
    HashCountMismatch { hashes: usize, total: u64 },

    #[error("metadata candidate of {0} bytes exceeds the size limit")]
    OversizedMetadata(usize),

    #[error("invalid magnet uri: {0}")]
    InvalidMagnet(&'static str),
}
