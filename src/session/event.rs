use super::error::SessionError;
use crate::store::{BlockRequest, ConnId};
use bytes::Bytes;
use std::time::Duration;

/// Capabilities a connection advertised during its handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkCapabilities {
    /// Peer can serve the structured description of the content
    /// (metadata extension).
    pub metadata_extension: bool,
    /// Peer will advertise a discovery port.
    pub discovery_port: bool,
}

/// Command surface of one peer connection, implemented by the wire
/// layer. Sends are queued by the transport and must not block.
pub trait PeerLink: Send {
    fn capabilities(&self) -> LinkCapabilities;

    /// Advertises our completion bitfield to the peer.
    fn advertise_bitfield(&mut self, bits: Bytes);

    /// Tells the peer we want to download from it.
    fn declare_interest(&mut self);

    /// Permits the peer to request blocks from us.
    fn grant_transfer(&mut self);

    fn request_block(&mut self, request: BlockRequest);

    fn send_block(&mut self, piece: u32, offset: u32, data: Bytes);

    /// Declines an incoming request without dropping the connection.
    fn reject_request(&mut self, piece: u32, offset: u32, length: u32);

    fn announce_have(&mut self, piece: u32);

    /// Asks the transport to fetch the full structured description.
    /// Completion arrives as [`LinkEvent::MetadataReceived`] or
    /// [`LinkEvent::MetadataFailed`].
    fn fetch_description(&mut self);

    fn set_keep_alive(&mut self, enabled: bool);

    fn set_request_timeout(&mut self, timeout: Duration);

    fn disconnect(&mut self);
}

/// Protocol events a connection delivers into the session.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Peer advertised its completion bitfield (raw wire bytes).
    Bitfield(Bytes),
    /// Peer announced one newly completed piece.
    HavePiece(u32),
    /// Peer permits us to request blocks.
    UnchokedUs,
    /// Peer revoked transfer permission.
    ChokedUs,
    /// Peer wants to download from us.
    Interested,
    /// Peer asks for a byte range of a piece.
    Request { piece: u32, offset: u32, length: u32 },
    /// A block we requested arrived.
    Block { piece: u32, offset: u32, data: Bytes },
    /// A block request failed or timed out; the connection stays up.
    RequestFailed { piece: u32, offset: u32 },
    /// Peer advertised its discovery port.
    PortAdvertised(u16),
    /// The transport assembled a full candidate description.
    MetadataReceived(Bytes),
    /// The transport gave up fetching the description on this
    /// connection.
    MetadataFailed,
}

/// Lifecycle milestones published by the session.
#[derive(Debug)]
pub enum SessionEvent {
    /// The wire layer reported the port it accepts connections on.
    Listening(u16),
    /// A validated description is installed; block exchange can begin.
    MetadataReady,
    /// One piece passed verification and was persisted.
    PieceVerified(u32),
    /// Every piece is verified. Emitted exactly once.
    DownloadComplete,
    Error(SessionError),
}

/// Receives peer discovery-port advertisements, e.g. for seeding a
/// routing table.
pub trait DiscoverySink: Send {
    fn port_advertised(&mut self, conn: ConnId, port: u16);
}
