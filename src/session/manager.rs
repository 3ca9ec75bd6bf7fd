use super::adapter::{AdapterSignal, PeerAdapter};
use super::bootstrap::{BootstrapPhase, MetadataBootstrap};
use super::error::SessionError;
use super::event::{DiscoverySink, LinkEvent, PeerLink, SessionEvent};
use super::progress::ThroughputWindow;
use crate::descriptor::{Descriptor, FileEntry, Fingerprint};
use crate::store::{Bitfield, ConnId, PieceStore, StorageBackend, WriteOutcome};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Where verified bytes are persisted.
#[derive(Debug, Clone)]
pub enum StorageKind {
    Memory,
    /// Download root; the descriptor's file table is laid out under it.
    Disk(PathBuf),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub storage: StorageKind,
    /// How long a fingerprint-only session may wait for a validated
    /// description before [`Session::check_deadline`] reports failure.
    /// `None` waits indefinitely.
    pub metadata_deadline: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            storage: StorageKind::Memory,
            metadata_deadline: None,
        }
    }
}

/// One download: adapters for every attached connection, the piece
/// store once a descriptor exists, and the bootstrap machine until
/// then. Drive it from a single task; nothing here locks.
pub struct Session {
    fingerprint: Fingerprint,
    name: Option<String>,
    descriptor: Option<Arc<Descriptor>>,
    store: Option<PieceStore>,
    bootstrap: MetadataBootstrap,
    adapters: HashMap<ConnId, PeerAdapter>,
    next_conn: ConnId,
    events: mpsc::UnboundedSender<SessionEvent>,
    discovery: Option<Box<dyn DiscoverySink>>,
    throughput: ThroughputWindow,
    uploaded: u64,
    options: SessionOptions,
    bootstrap_started: Option<Instant>,
    deadline_reported: bool,
    complete_reported: bool,
}

impl Session {
    /// Starts from a full descriptor; block exchange is possible from
    /// the first attached peer.
    pub fn from_descriptor(
        descriptor: Descriptor,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let fingerprint = descriptor.fingerprint();
        let (mut session, receiver) =
            Self::build(fingerprint, MetadataBootstrap::ready(fingerprint), options);
        session.install_descriptor(Arc::new(descriptor));
        (session, receiver)
    }

    /// Starts from a bare fingerprint; the descriptor is bootstrapped
    /// from capable peers before any blocks move.
    pub fn from_fingerprint(
        fingerprint: Fingerprint,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        Self::build(fingerprint, MetadataBootstrap::new(fingerprint), options)
    }

    fn build(
        fingerprint: Fingerprint,
        bootstrap: MetadataBootstrap,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Session {
            fingerprint,
            name: None,
            descriptor: None,
            store: None,
            bootstrap,
            adapters: HashMap::new(),
            next_conn: 0,
            events,
            discovery: None,
            throughput: ThroughputWindow::new(),
            uploaded: 0,
            options,
            bootstrap_started: None,
            deadline_reported: false,
            complete_reported: false,
        };
        (session, receiver)
    }

    pub fn with_discovery(mut self, sink: Box<dyn DiscoverySink>) -> Self {
        self.discovery = Some(sink);
        self
    }

    fn install_descriptor(&mut self, descriptor: Arc<Descriptor>) {
        let backend = match &self.options.storage {
            StorageKind::Memory => StorageBackend::memory(descriptor.total_length),
            StorageKind::Disk(base) => {
                StorageBackend::disk(base.clone(), descriptor.files.clone())
            }
        };
        self.name = Some(descriptor.name.clone());
        self.store = Some(PieceStore::new(descriptor.clone(), backend));
        self.descriptor = Some(descriptor);
    }

    /// Adopts a connection the wire layer finished handshaking.
    /// Returns the id all further events for it must carry.
    pub fn attach_peer(&mut self, link: Box<dyn PeerLink>) -> ConnId {
        let conn = self.next_conn;
        self.next_conn += 1;

        let mut adapter = PeerAdapter::new(conn, link);
        match self.store.as_mut() {
            Some(store) => adapter.enter_exchange(store),
            None => {
                if adapter.capabilities().metadata_extension {
                    self.bootstrap.begin_fetch();
                    self.bootstrap_started.get_or_insert_with(Instant::now);
                    adapter.begin_bootstrap();
                }
            }
        }
        debug!(conn, "peer attached");
        self.adapters.insert(conn, adapter);
        conn
    }

    /// Tears one connection down, returning its block claims to the
    /// pool.
    pub fn remove_peer(&mut self, conn: ConnId) {
        if let Some(mut adapter) = self.adapters.remove(&conn) {
            adapter.shutdown(self.store.as_mut());
            debug!(conn, "peer removed");
        }
    }

    /// The wire layer reports the port it listens on.
    pub fn on_listening(&mut self, port: u16) {
        self.emit(SessionEvent::Listening(port));
    }

    /// The wire layer failed to start listening; fatal for the session.
    pub fn on_listen_error(&mut self, reason: impl Into<String>) {
        self.emit(SessionEvent::Error(SessionError::Listen(reason.into())));
    }

    /// Dispatches one protocol event from connection `conn`. Unknown
    /// ids are ignored (the connection may have been removed already).
    pub async fn handle_link_event(&mut self, conn: ConnId, event: LinkEvent) {
        let Some(adapter) = self.adapters.get_mut(&conn) else {
            return;
        };
        let signal = match adapter.handle(event, &mut self.store).await {
            Ok(signal) => signal,
            Err(err) if err.is_peer_fault() => {
                warn!(conn, %err, "ignoring invalid peer data");
                return;
            }
            Err(err) => {
                self.emit(SessionEvent::Error(err.into()));
                return;
            }
        };

        match signal {
            AdapterSignal::None => {}
            AdapterSignal::Served(bytes) => self.uploaded += bytes as u64,
            AdapterSignal::Stored(outcome, bytes) => {
                self.throughput.record(bytes as u64);
                self.publish_outcome(outcome);
            }
            AdapterSignal::Dropped => self.remove_peer(conn),
            AdapterSignal::PortAdvertised(port) => {
                if let Some(sink) = &mut self.discovery {
                    sink.port_advertised(conn, port);
                }
            }
            AdapterSignal::Metadata(candidate) => self.accept_metadata(&candidate),
            AdapterSignal::MetadataFailed => {
                debug!(conn, "description fetch failed on this connection");
            }
        }
    }

    fn publish_outcome(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Pending => {}
            // The store already reset the piece; peers retry silently.
            WriteOutcome::HashMismatch { .. } => {}
            WriteOutcome::PieceVerified { index, all_complete } => {
                for adapter in self.adapters.values_mut() {
                    adapter.announce_have(index);
                }
                self.emit(SessionEvent::PieceVerified(index));
                if all_complete && !self.complete_reported {
                    self.complete_reported = true;
                    self.emit(SessionEvent::DownloadComplete);
                }
            }
        }
    }

    fn accept_metadata(&mut self, candidate: &[u8]) {
        match self.bootstrap.accept(candidate) {
            Ok(Some(descriptor)) => {
                self.install_descriptor(descriptor);
                if let Some(store) = self.store.as_mut() {
                    for adapter in self.adapters.values_mut() {
                        adapter.enter_exchange(store);
                    }
                }
                self.emit(SessionEvent::MetadataReady);
            }
            Ok(None) => {}
            Err(err) => self.emit(SessionEvent::Error(err.into())),
        }
    }

    /// Reports the configured metadata deadline if it has elapsed with
    /// no validated description; call periodically from the driving
    /// loop.
    pub fn check_deadline(&mut self) {
        let Some(deadline) = self.options.metadata_deadline else {
            return;
        };
        if self.deadline_reported || self.descriptor.is_some() {
            return;
        }
        if let Some(started) = self.bootstrap_started {
            if started.elapsed() >= deadline {
                self.deadline_reported = true;
                self.emit(SessionEvent::Error(SessionError::MetadataDeadline));
            }
        }
    }

    /// Disconnects every peer and drops storage state.
    pub fn destroy(&mut self) {
        let mut adapters: Vec<PeerAdapter> = self.adapters.drain().map(|(_, a)| a).collect();
        for adapter in &mut adapters {
            adapter.shutdown(self.store.as_mut());
        }
        self.store = None;
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Content name; `None` until a descriptor is known.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn descriptor(&self) -> Option<&Arc<Descriptor>> {
        self.descriptor.as_ref()
    }

    pub fn files(&self) -> &[FileEntry] {
        self.descriptor.as_ref().map(|d| d.files.as_slice()).unwrap_or(&[])
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.bootstrap.phase()
    }

    pub fn peer_count(&self) -> usize {
        self.adapters.len()
    }

    /// Verified bytes downloaded so far.
    pub fn downloaded(&self) -> u64 {
        self.store.as_ref().map(PieceStore::downloaded).unwrap_or(0)
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded
    }

    pub fn bitfield(&self) -> Option<&Bitfield> {
        self.store.as_ref().map(PieceStore::bitfield)
    }

    pub fn num_missing(&self) -> Option<usize> {
        self.store.as_ref().map(PieceStore::num_missing)
    }

    pub fn is_complete(&self) -> bool {
        self.store.as_ref().is_some_and(PieceStore::is_complete)
    }

    /// Estimated time to completion from recent throughput; `None`
    /// before the descriptor exists or while no bytes are arriving.
    pub fn eta(&mut self) -> Option<Duration> {
        let remaining = self.store.as_ref()?.remaining();
        self.throughput.eta(remaining)
    }

    fn emit(&self, event: SessionEvent) {
        // A dropped receiver just means nobody is watching anymore.
        let _ = self.events.send(event);
    }
}
