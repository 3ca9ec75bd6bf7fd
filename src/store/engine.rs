use super::backend::StorageBackend;
use super::bitfield::Bitfield;
use super::error::StoreError;
use super::piece::{BlockRequest, ConnId, Piece};
use crate::descriptor::Descriptor;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a block write did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Block buffered; the piece is not complete yet (or the write was
    /// a duplicate for an already verified piece and was ignored).
    Pending,
    /// The piece completed, verified, and was persisted.
    PieceVerified { index: u32, all_complete: bool },
    /// The piece completed but failed verification; all of its blocks
    /// were reverted to missing.
    HashMismatch { index: u32 },
}

/// Single arbiter of block and piece state for one download.
#[derive(Debug)]
pub struct PieceStore {
    descriptor: Arc<Descriptor>,
    pieces: Vec<Piece>,
    bitfield: Bitfield,
    backend: StorageBackend,
    downloaded: u64,
}

impl PieceStore {
    pub fn new(descriptor: Arc<Descriptor>, backend: StorageBackend) -> Self {
        let pieces = (0..descriptor.piece_count())
            .map(|index| Piece::new(descriptor.piece_size(index)))
            .collect();
        let bitfield = Bitfield::new(descriptor.piece_count() as usize);
        PieceStore {
            descriptor,
            pieces,
            bitfield,
            backend,
            downloaded: 0,
        }
    }

    pub fn descriptor(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    /// Claims the next block of `piece` for `conn`, lowest offset
    /// first. Returns `None` when the piece has nothing selectable for
    /// this connection.
    pub fn select_block(&mut self, piece: u32, endgame: bool, conn: ConnId) -> Option<BlockRequest> {
        let slot = self.pieces.get_mut(piece as usize)?;
        if slot.verified {
            return None;
        }
        slot.select(endgame, conn)
            .map(|(offset, length)| BlockRequest { piece, offset, length })
    }

    /// Withdraws `conn`'s claim on one block. Idempotent.
    pub fn deselect_block(&mut self, piece: u32, offset: u32, conn: ConnId) {
        if let Some(slot) = self.pieces.get_mut(piece as usize) {
            slot.deselect(offset, conn);
        }
    }

    /// Withdraws every claim held by `conn` (connection teardown).
    pub fn release_connection(&mut self, conn: ConnId) {
        for slot in &mut self.pieces {
            if !slot.verified {
                slot.release(conn);
            }
        }
    }

    /// Accepts one block. The write must match a block boundary
    /// exactly. When it completes the piece, the piece is verified
    /// against its expected digest and either persisted or reset.
    pub async fn write_block(
        &mut self,
        piece: u32,
        offset: u32,
        data: &[u8],
    ) -> Result<WriteOutcome, StoreError> {
        let slot = self
            .pieces
            .get_mut(piece as usize)
            .ok_or(StoreError::InvalidPiece(piece))?;
        if slot.verified {
            // Late duplicate, e.g. an endgame double-delivery.
            return Ok(WriteOutcome::Pending);
        }
        let aligned = slot
            .blocks
            .iter()
            .any(|b| b.offset == offset && b.length as usize == data.len());
        if !aligned {
            return Err(StoreError::InvalidBlock {
                piece,
                offset,
                length: data.len() as u32,
            });
        }

        if !slot.write(offset, data) {
            return Ok(WriteOutcome::Pending);
        }

        // Every block is in; nothing is trusted until the digest holds.
        let Some(bytes) = slot.buffer.take() else {
            return Ok(WriteOutcome::Pending);
        };
        let expected = self
            .descriptor
            .piece_hash(piece)
            .ok_or(StoreError::InvalidPiece(piece))?;
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        let digest: [u8; 20] = hasher.finalize().into();
        if digest != *expected {
            warn!(piece, "piece failed verification, resetting");
            slot.reset();
            return Ok(WriteOutcome::HashMismatch { index: piece });
        }

        self.backend
            .write_at(self.descriptor.piece_offset(piece), &bytes)
            .await?;
        slot.verified = true;
        self.bitfield.set(piece as usize);
        self.downloaded += slot.length as u64;
        debug!(piece, "piece verified");
        Ok(WriteOutcome::PieceVerified {
            index: piece,
            all_complete: self.bitfield.is_complete(),
        })
    }

    /// Reads a verified byte range for serving to a peer. `Ok(None)`
    /// means the piece is not verified yet and must not be served.
    pub async fn read_block(
        &self,
        piece: u32,
        offset: u32,
        length: u32,
    ) -> Result<Option<Bytes>, StoreError> {
        let slot = self
            .pieces
            .get(piece as usize)
            .ok_or(StoreError::InvalidPiece(piece))?;
        if !slot.verified {
            return Ok(None);
        }
        if offset as u64 + length as u64 > slot.length as u64 {
            return Err(StoreError::InvalidBlock { piece, offset, length });
        }
        let flat = self.descriptor.piece_offset(piece) + offset as u64;
        self.backend.read_at(flat, length as usize).await.map(Some)
    }

    /// Whether a scheduler pass should consider `piece` at all: not yet
    /// verified and holding at least one selectable block.
    pub fn is_requestable(&self, piece: u32, endgame: bool) -> bool {
        match self.pieces.get(piece as usize) {
            Some(slot) if !slot.verified => {
                if endgame {
                    slot.has_unwritten()
                } else {
                    slot.has_missing()
                }
            }
            _ => false,
        }
    }

    /// Count of pieces not yet verified.
    pub fn num_missing(&self) -> usize {
        self.pieces.iter().filter(|p| !p.verified).count()
    }

    pub fn has_piece(&self, piece: u32) -> bool {
        self.bitfield.has(piece as usize)
    }

    pub fn bitfield(&self) -> &Bitfield {
        &self.bitfield
    }

    pub fn is_complete(&self) -> bool {
        self.bitfield.is_complete()
    }

    /// Verified bytes accumulated so far.
    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub fn remaining(&self) -> u64 {
        self.descriptor.total_length - self.downloaded
    }
}
