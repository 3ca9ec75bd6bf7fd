//! Swarm download core: piece scheduling, verified storage, and
//! metadata bootstrap.
//!
//! This crate is the layer between per-peer wire connections and
//! durable storage. The wire layer hands a [`Session`] its connections
//! as [`PeerLink`]s plus [`LinkEvent`] streams; the session schedules
//! block requests across them, buffers and SHA-1-verifies each piece,
//! persists verified bytes through a memory or disk backend, and
//! publishes lifecycle milestones as [`SessionEvent`]s. A session can
//! start from a full [`Descriptor`] or from a bare [`Fingerprint`]
//! (e.g. out of a [`MagnetUri`]), in which case the description is
//! bootstrapped from capable peers first.
//!
//! Handshakes, trackers, DHT, and sockets live outside this crate.
//!
//! ```no_run
//! use minnow::{Descriptor, Session, SessionEvent, SessionOptions};
//!
//! # async fn run(metainfo: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let descriptor = Descriptor::from_torrent_bytes(metainfo)?;
//! let (mut session, mut events) = Session::from_descriptor(
//!     descriptor,
//!     SessionOptions::default(),
//! );
//! // Attach peers from the wire layer, feed their events into
//! // `session.handle_link_event`, and watch for milestones:
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::DownloadComplete = event {
//!         break;
//!     }
//! }
//! session.destroy();
//! # Ok(())
//! # }
//! ```

pub mod bencode;
pub mod constants;
pub mod descriptor;
pub mod scheduler;
pub mod session;
pub mod store;

pub use descriptor::{Descriptor, DescriptorError, FileEntry, Fingerprint, MagnetUri};
pub use scheduler::RequestScheduler;
pub use session::{
    AdapterMode, BootstrapPhase, DiscoverySink, LinkCapabilities, LinkEvent, MetadataBootstrap,
    PeerAdapter, PeerLink, Session, SessionError, SessionEvent, SessionOptions, StorageKind,
    ThroughputWindow,
};
pub use store::{
    Bitfield, BlockRequest, BlockState, ConnId, PieceStore, StorageBackend, StoreError,
    WriteOutcome,
};
