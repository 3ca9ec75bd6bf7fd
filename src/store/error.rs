use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid piece index {0}")]
    InvalidPiece(u32),

    #[error("invalid block: piece {piece}, offset {offset}, length {length}")]
    InvalidBlock { piece: u32, offset: u32, length: u32 },

    #[error("byte range {offset}+{length} outside stored content")]
    OutOfRange { offset: u64, length: u64 },
}

impl StoreError {
    /// True for faults caused by a misbehaving peer rather than the
    /// local machine; these never tear a session down.
    pub fn is_peer_fault(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidPiece(_) | StoreError::InvalidBlock { .. }
        )
    }
}
