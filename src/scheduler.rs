//! Per-connection block request scheduling.
//!
//! Each connection owns one [`RequestScheduler`]: a window of at most
//! five outstanding block requests, refilled whenever the window has
//! room. Selection is deterministic — lowest piece index first, lowest
//! offset within a piece — so two fills over identical state pick the
//! same blocks. Near the end of a download the scheduler enters endgame
//! and may duplicate requests that other connections already hold.

use crate::constants::{ENDGAME_PIECE_THRESHOLD, MAX_OUTSTANDING_REQUESTS};
use crate::store::{Bitfield, BlockRequest, ConnId, PieceStore};
use tracing::trace;

#[derive(Debug)]
pub struct RequestScheduler {
    conn: ConnId,
    outstanding: Vec<BlockRequest>,
}

impl RequestScheduler {
    pub fn new(conn: ConnId) -> Self {
        RequestScheduler {
            conn,
            outstanding: Vec::with_capacity(MAX_OUTSTANDING_REQUESTS),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Endgame is evaluated per fill: this connection idle and the
    /// download nearly complete.
    fn endgame(&self, store: &PieceStore) -> bool {
        self.outstanding.is_empty() && store.num_missing() < ENDGAME_PIECE_THRESHOLD
    }

    /// Tops the window up from the peer's advertised pieces, claiming
    /// blocks in the store. Returns the newly issued requests.
    pub fn fill(&mut self, peer_pieces: &Bitfield, store: &mut PieceStore) -> Vec<BlockRequest> {
        let endgame = self.endgame(store);
        let mut issued = Vec::new();
        for piece in 0..peer_pieces.len() as u32 {
            if self.outstanding.len() >= MAX_OUTSTANDING_REQUESTS {
                break;
            }
            if !peer_pieces.has(piece as usize) || !store.is_requestable(piece, endgame) {
                continue;
            }
            while self.outstanding.len() < MAX_OUTSTANDING_REQUESTS {
                match store.select_block(piece, endgame, self.conn) {
                    Some(request) => {
                        self.outstanding.push(request);
                        issued.push(request);
                    }
                    None => break,
                }
            }
        }
        if !issued.is_empty() {
            trace!(conn = self.conn, endgame, count = issued.len(), "filled request window");
        }
        issued
    }

    /// Matches a block response against its outstanding request.
    /// Returns false for blocks this connection never asked for.
    pub fn complete(&mut self, piece: u32, offset: u32) -> bool {
        match self.position(piece, offset) {
            Some(pos) => {
                self.outstanding.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Reverts a failed or timed-out request. Other connections'
    /// endgame claims on the same block stay intact.
    pub fn fail(&mut self, piece: u32, offset: u32, store: &mut PieceStore) {
        if let Some(pos) = self.position(piece, offset) {
            self.outstanding.swap_remove(pos);
            store.deselect_block(piece, offset, self.conn);
        }
    }

    /// Withdraws every claim this connection holds (teardown).
    pub fn release(&mut self, store: &mut PieceStore) {
        self.outstanding.clear();
        store.release_connection(self.conn);
    }

    fn position(&self, piece: u32, offset: u32) -> Option<usize> {
        self.outstanding
            .iter()
            .position(|r| r.piece == piece && r.offset == offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::{encode, Value};
    use crate::descriptor::Descriptor;
    use crate::store::StorageBackend;
    use bytes::Bytes;
    use sha1::{Digest, Sha1};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn store_with(piece_length: u32, total: usize) -> PieceStore {
        let content: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
        let mut blob = Vec::new();
        for chunk in content.chunks(piece_length as usize) {
            let mut hasher = Sha1::new();
            hasher.update(chunk);
            blob.extend_from_slice(&hasher.finalize());
        }
        let mut map = BTreeMap::new();
        map.insert(Bytes::from_static(b"length"), Value::Integer(total as i64));
        map.insert(Bytes::from_static(b"name"), Value::string("data.bin"));
        map.insert(
            Bytes::from_static(b"piece length"),
            Value::Integer(piece_length as i64),
        );
        map.insert(Bytes::from_static(b"pieces"), Value::Bytes(Bytes::from(blob)));
        let descriptor =
            Arc::new(Descriptor::from_info_bytes(&encode(&Value::Dict(map))).unwrap());
        let backend = StorageBackend::memory(descriptor.total_length);
        PieceStore::new(descriptor, backend)
    }

    fn full_bitfield(store: &PieceStore) -> Bitfield {
        let pieces = store.bitfield().len();
        let mut field = Bitfield::new(pieces);
        for piece in 0..pieces {
            field.set(piece);
        }
        field
    }

    #[test]
    fn fill_caps_the_window_at_five() {
        // Eight single-block pieces on offer; the window still caps at five.
        let mut store = store_with(16384, 8 * 16384);
        let peer = full_bitfield(&store);
        let mut scheduler = RequestScheduler::new(1);

        let issued = scheduler.fill(&peer, &mut store);
        assert_eq!(issued.len(), 5);
        assert_eq!(scheduler.outstanding(), 5);
        assert!(scheduler.fill(&peer, &mut store).is_empty());
    }

    #[test]
    fn fill_is_deterministic_lowest_first() {
        let mut store = store_with(32768, 3 * 32768);
        let peer = full_bitfield(&store);
        let mut scheduler = RequestScheduler::new(1);

        let issued = scheduler.fill(&peer, &mut store);
        let order: Vec<(u32, u32)> = issued.iter().map(|r| (r.piece, r.offset)).collect();
        assert_eq!(order, vec![(0, 0), (0, 16384), (1, 0), (1, 16384), (2, 0)]);
    }

    #[test]
    fn fill_skips_pieces_the_peer_lacks() {
        let mut store = store_with(16384, 4 * 16384);
        let mut peer = Bitfield::new(4);
        peer.set(2);
        let mut scheduler = RequestScheduler::new(1);

        let issued = scheduler.fill(&peer, &mut store);
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].piece, 2);
    }

    #[test]
    fn complete_frees_a_slot_and_flags_unsolicited_blocks() {
        let mut store = store_with(16384, 8 * 16384);
        let peer = full_bitfield(&store);
        let mut scheduler = RequestScheduler::new(1);
        scheduler.fill(&peer, &mut store);

        assert!(scheduler.complete(0, 0));
        assert_eq!(scheduler.outstanding(), 4);
        assert!(!scheduler.complete(0, 0));
        assert!(!scheduler.complete(7, 0));
    }

    #[test]
    fn fail_reverts_the_claim_for_reissue() {
        let mut store = store_with(16384, 2 * 16384);
        let peer = full_bitfield(&store);
        let mut scheduler = RequestScheduler::new(1);
        scheduler.fill(&peer, &mut store);

        scheduler.fail(0, 0, &mut store);
        assert_eq!(scheduler.outstanding(), 1);

        // Another connection can pick the block up immediately.
        let mut other = RequestScheduler::new(2);
        let issued = other.fill(&peer, &mut store);
        assert_eq!(issued.len(), 1);
        assert_eq!((issued[0].piece, issued[0].offset), (0, 0));
    }

    #[test]
    fn endgame_duplicates_only_when_idle_and_nearly_done() {
        // 2 pieces missing, under the threshold of 30.
        let mut store = store_with(16384, 2 * 16384);
        let peer = full_bitfield(&store);

        let mut first = RequestScheduler::new(1);
        assert_eq!(first.fill(&peer, &mut store).len(), 2);

        // An idle second connection doubles up on both blocks.
        let mut second = RequestScheduler::new(2);
        let issued = second.fill(&peer, &mut store);
        assert_eq!(issued.len(), 2);

        // A busy connection does not re-enter endgame while requests
        // are outstanding.
        assert!(second.fill(&peer, &mut store).is_empty());
    }

    #[test]
    fn release_returns_every_claim() {
        let mut store = store_with(16384, 40 * 16384);
        let peer = full_bitfield(&store);
        let mut scheduler = RequestScheduler::new(1);
        scheduler.fill(&peer, &mut store);

        scheduler.release(&mut store);
        assert_eq!(scheduler.outstanding(), 0);

        let mut other = RequestScheduler::new(2);
        let issued = other.fill(&peer, &mut store);
        assert_eq!(issued[0], BlockRequest { piece: 0, offset: 0, length: 16384 });
    }
}
