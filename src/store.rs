//! Verified block and piece storage.
//!
//! The [`PieceStore`] is the single arbiter of block state: which
//! blocks are missing, requested (and by which connections), or
//! written. Incoming blocks are buffered per piece until the piece is
//! complete, verified against the descriptor's SHA-1 digest, and only
//! then persisted through a [`StorageBackend`]. Failed verification
//! resets the whole piece to missing. The completion [`Bitfield`] flips
//! a bit exactly once per piece, at verification time.

mod backend;
mod bitfield;
mod engine;
mod error;
mod piece;

pub use backend::{DiskBackend, MemoryBackend, StorageBackend};
pub use bitfield::Bitfield;
pub use engine::{PieceStore, WriteOutcome};
pub use error::StoreError;
pub use piece::{BlockRequest, BlockState, ConnId};
