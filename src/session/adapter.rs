use super::event::{LinkCapabilities, LinkEvent, PeerLink};
use crate::constants::{MAX_REQUEST_LENGTH, REQUEST_TIMEOUT};
use crate::scheduler::RequestScheduler;
use crate::store::{Bitfield, ConnId, PieceStore, StoreError, WriteOutcome};
use bytes::Bytes;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterMode {
    /// No descriptor yet; the connection is only useful for fetching
    /// the description.
    Bootstrap,
    /// Descriptor installed; blocks flow both ways.
    Exchange,
}

/// What the session should do after an adapter handled an event.
#[derive(Debug)]
pub(super) enum AdapterSignal {
    None,
    /// Served this many verified bytes to the peer.
    Served(u32),
    /// A block write advanced the store; the payload length feeds the
    /// throughput window.
    Stored(WriteOutcome, usize),
    /// The transport assembled a candidate description.
    Metadata(Bytes),
    /// The transport gave up on the description here.
    MetadataFailed,
    /// Protocol violation; the link was already told to disconnect.
    Dropped,
    PortAdvertised(u16),
}

/// Binds one [`PeerLink`] to the scheduler and store: translates
/// protocol events into state changes and keeps the request pipeline
/// full.
pub struct PeerAdapter {
    conn: ConnId,
    link: Box<dyn PeerLink>,
    scheduler: RequestScheduler,
    mode: AdapterMode,
    peer_pieces: Option<Bitfield>,
    /// Raw bitfield received before the descriptor was known; inflated
    /// once the piece count is.
    pending_bits: Option<Bytes>,
    pending_haves: Vec<u32>,
    unchoked: bool,
}

impl PeerAdapter {
    pub(super) fn new(conn: ConnId, mut link: Box<dyn PeerLink>) -> Self {
        link.set_keep_alive(true);
        link.set_request_timeout(REQUEST_TIMEOUT);
        PeerAdapter {
            conn,
            link,
            scheduler: RequestScheduler::new(conn),
            mode: AdapterMode::Bootstrap,
            peer_pieces: None,
            pending_bits: None,
            pending_haves: Vec::new(),
            unchoked: false,
        }
    }

    pub fn conn(&self) -> ConnId {
        self.conn
    }

    pub fn mode(&self) -> AdapterMode {
        self.mode
    }

    pub(super) fn capabilities(&self) -> LinkCapabilities {
        self.link.capabilities()
    }

    pub(super) fn begin_bootstrap(&mut self) {
        self.link.fetch_description();
    }

    /// Switches into block exchange once the descriptor is known:
    /// advertise what we have, declare interest, replay anything the
    /// peer told us before the piece count existed.
    pub(super) fn enter_exchange(&mut self, store: &mut PieceStore) {
        self.mode = AdapterMode::Exchange;
        self.link.advertise_bitfield(store.bitfield().to_bytes());
        self.link.declare_interest();

        let piece_count = store.bitfield().len();
        if let Some(raw) = self.pending_bits.take() {
            self.peer_pieces = Some(Bitfield::from_bytes(&raw, piece_count));
        }
        if !self.pending_haves.is_empty() {
            let field = self
                .peer_pieces
                .get_or_insert_with(|| Bitfield::new(piece_count));
            for piece in self.pending_haves.drain(..) {
                field.set(piece as usize);
            }
        }
        self.refill(store);
    }

    pub(super) fn announce_have(&mut self, piece: u32) {
        self.link.announce_have(piece);
    }

    pub(super) fn shutdown(&mut self, store: Option<&mut PieceStore>) {
        if let Some(store) = store {
            self.scheduler.release(store);
        }
        self.link.disconnect();
    }

    /// Tops the request window up and pushes the new requests out.
    fn refill(&mut self, store: &mut PieceStore) {
        if !self.unchoked {
            return;
        }
        let Some(peer_pieces) = &self.peer_pieces else {
            return;
        };
        for request in self.scheduler.fill(peer_pieces, store) {
            self.link.request_block(request);
        }
    }

    pub(super) async fn handle(
        &mut self,
        event: LinkEvent,
        store: &mut Option<PieceStore>,
    ) -> Result<AdapterSignal, StoreError> {
        match event {
            LinkEvent::Bitfield(raw) => {
                match store {
                    Some(store) => {
                        let piece_count = store.bitfield().len();
                        self.peer_pieces = Some(Bitfield::from_bytes(&raw, piece_count));
                        self.refill(store);
                    }
                    None => self.pending_bits = Some(raw),
                }
                Ok(AdapterSignal::None)
            }
            LinkEvent::HavePiece(piece) => {
                match store {
                    Some(store) => {
                        let piece_count = store.bitfield().len();
                        let field = self
                            .peer_pieces
                            .get_or_insert_with(|| Bitfield::new(piece_count));
                        field.set(piece as usize);
                        self.refill(store);
                    }
                    None => self.pending_haves.push(piece),
                }
                Ok(AdapterSignal::None)
            }
            LinkEvent::UnchokedUs => {
                self.unchoked = true;
                if let Some(store) = store {
                    self.refill(store);
                }
                Ok(AdapterSignal::None)
            }
            LinkEvent::ChokedUs => {
                self.unchoked = false;
                Ok(AdapterSignal::None)
            }
            LinkEvent::Interested => {
                // No reciprocity algorithm: interest is always granted.
                self.link.grant_transfer();
                Ok(AdapterSignal::None)
            }
            LinkEvent::Request { piece, offset, length } => {
                if length > MAX_REQUEST_LENGTH {
                    warn!(conn = self.conn, length, "oversized block request, dropping peer");
                    self.link.disconnect();
                    return Ok(AdapterSignal::Dropped);
                }
                let Some(store) = store else {
                    self.link.reject_request(piece, offset, length);
                    return Ok(AdapterSignal::None);
                };
                match store.read_block(piece, offset, length).await? {
                    Some(data) => {
                        self.link.send_block(piece, offset, data);
                        Ok(AdapterSignal::Served(length))
                    }
                    None => {
                        self.link.reject_request(piece, offset, length);
                        Ok(AdapterSignal::None)
                    }
                }
            }
            LinkEvent::Block { piece, offset, data } => {
                let Some(store) = store else {
                    return Ok(AdapterSignal::None);
                };
                // Unsolicited blocks are written anyway; the store is
                // the arbiter of block state.
                self.scheduler.complete(piece, offset);
                let length = data.len();
                let outcome = store.write_block(piece, offset, &data).await?;
                self.refill(store);
                Ok(AdapterSignal::Stored(outcome, length))
            }
            LinkEvent::RequestFailed { piece, offset } => {
                if let Some(store) = store {
                    self.scheduler.fail(piece, offset, store);
                    self.refill(store);
                }
                Ok(AdapterSignal::None)
            }
            LinkEvent::PortAdvertised(port) => Ok(AdapterSignal::PortAdvertised(port)),
            LinkEvent::MetadataReceived(candidate) => Ok(AdapterSignal::Metadata(candidate)),
            LinkEvent::MetadataFailed => Ok(AdapterSignal::MetadataFailed),
        }
    }
}
