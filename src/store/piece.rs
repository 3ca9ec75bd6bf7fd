use crate::constants::BLOCK_SIZE;

/// Identifies one peer connection within a session.
pub type ConnId = u64;

/// A block request addressed to a peer: piece index, byte offset within
/// the piece, and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    pub piece: u32,
    pub offset: u32,
    pub length: u32,
}

/// Lifecycle of one block within a piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockState {
    Missing,
    /// Outstanding with the listed connections. Endgame may add more
    /// than one owner; the block reverts to missing only when the last
    /// owner withdraws.
    Requested(Vec<ConnId>),
    Written,
}

#[derive(Debug)]
pub(super) struct Block {
    pub offset: u32,
    pub length: u32,
    pub state: BlockState,
}

/// In-flight assembly state of one piece. The byte buffer exists only
/// while blocks are arriving; it is dropped on verification or reset.
#[derive(Debug)]
pub(super) struct Piece {
    pub length: u32,
    pub blocks: Vec<Block>,
    pub buffer: Option<Vec<u8>>,
    pub verified: bool,
}

impl Piece {
    pub fn new(length: u32) -> Self {
        let mut blocks = Vec::with_capacity(length.div_ceil(BLOCK_SIZE) as usize);
        let mut offset = 0;
        while offset < length {
            let block_length = (length - offset).min(BLOCK_SIZE);
            blocks.push(Block {
                offset,
                length: block_length,
                state: BlockState::Missing,
            });
            offset += block_length;
        }
        Piece {
            length,
            blocks,
            buffer: None,
            verified: false,
        }
    }

    pub fn block_at(&mut self, offset: u32) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.offset == offset)
    }

    /// Claims the lowest-offset selectable block for `conn`. Outside
    /// endgame only missing blocks qualify; in endgame a block already
    /// requested elsewhere may gain a second owner. Written blocks are
    /// never selected.
    pub fn select(&mut self, endgame: bool, conn: ConnId) -> Option<(u32, u32)> {
        for block in &mut self.blocks {
            if block.state == BlockState::Missing {
                block.state = BlockState::Requested(vec![conn]);
                return Some((block.offset, block.length));
            }
        }
        if !endgame {
            return None;
        }
        for block in &mut self.blocks {
            if let BlockState::Requested(owners) = &mut block.state {
                if !owners.contains(&conn) {
                    owners.push(conn);
                    return Some((block.offset, block.length));
                }
            }
        }
        None
    }

    /// Withdraws `conn`'s claim on the block at `offset`. Idempotent;
    /// other connections' claims stay intact.
    pub fn deselect(&mut self, offset: u32, conn: ConnId) {
        if let Some(block) = self.block_at(offset) {
            if let BlockState::Requested(owners) = &mut block.state {
                owners.retain(|&owner| owner != conn);
                if owners.is_empty() {
                    block.state = BlockState::Missing;
                }
            }
        }
    }

    pub fn release(&mut self, conn: ConnId) {
        let offsets: Vec<u32> = self.blocks.iter().map(|b| b.offset).collect();
        for offset in offsets {
            self.deselect(offset, conn);
        }
    }

    /// Copies block bytes into the assembly buffer and marks the block
    /// written. Returns true when every block of the piece is written.
    pub fn write(&mut self, offset: u32, data: &[u8]) -> bool {
        let length = self.length as usize;
        let buffer = self.buffer.get_or_insert_with(|| vec![0; length]);
        buffer[offset as usize..offset as usize + data.len()].copy_from_slice(data);
        if let Some(block) = self.block_at(offset) {
            block.state = BlockState::Written;
        }
        self.blocks.iter().all(|b| b.state == BlockState::Written)
    }

    /// Reverts the piece to pristine after failed verification.
    pub fn reset(&mut self) {
        self.buffer = None;
        for block in &mut self.blocks {
            block.state = BlockState::Missing;
        }
    }

    pub fn has_missing(&self) -> bool {
        self.blocks.iter().any(|b| b.state == BlockState::Missing)
    }

    pub fn has_unwritten(&self) -> bool {
        self.blocks.iter().any(|b| b.state != BlockState::Written)
    }
}
