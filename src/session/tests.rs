use super::*;
use crate::bencode::{encode, Value};
use crate::descriptor::Descriptor;
use crate::store::BlockRequest;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, Default)]
struct LinkLog {
    requested: Vec<BlockRequest>,
    sent: Vec<(u32, u32, Bytes)>,
    rejected: Vec<(u32, u32, u32)>,
    haves: Vec<u32>,
    bitfields: Vec<Bytes>,
    interested: usize,
    granted: usize,
    fetches: usize,
    disconnected: bool,
}

struct FakeLink {
    caps: LinkCapabilities,
    log: Arc<Mutex<LinkLog>>,
}

impl FakeLink {
    fn new() -> (Self, Arc<Mutex<LinkLog>>) {
        let log = Arc::new(Mutex::new(LinkLog::default()));
        let link = FakeLink {
            caps: LinkCapabilities::default(),
            log: log.clone(),
        };
        (link, log)
    }

    fn with_metadata() -> (Self, Arc<Mutex<LinkLog>>) {
        let (mut link, log) = Self::new();
        link.caps.metadata_extension = true;
        (link, log)
    }
}

impl PeerLink for FakeLink {
    fn capabilities(&self) -> LinkCapabilities {
        self.caps
    }

    fn advertise_bitfield(&mut self, bits: Bytes) {
        self.log.lock().unwrap().bitfields.push(bits);
    }

    fn declare_interest(&mut self) {
        self.log.lock().unwrap().interested += 1;
    }

    fn grant_transfer(&mut self) {
        self.log.lock().unwrap().granted += 1;
    }

    fn request_block(&mut self, request: BlockRequest) {
        self.log.lock().unwrap().requested.push(request);
    }

    fn send_block(&mut self, piece: u32, offset: u32, data: Bytes) {
        self.log.lock().unwrap().sent.push((piece, offset, data));
    }

    fn reject_request(&mut self, piece: u32, offset: u32, length: u32) {
        self.log.lock().unwrap().rejected.push((piece, offset, length));
    }

    fn announce_have(&mut self, piece: u32) {
        self.log.lock().unwrap().haves.push(piece);
    }

    fn fetch_description(&mut self) {
        self.log.lock().unwrap().fetches += 1;
    }

    fn set_keep_alive(&mut self, _enabled: bool) {}

    fn set_request_timeout(&mut self, _timeout: Duration) {}

    fn disconnect(&mut self) {
        self.log.lock().unwrap().disconnected = true;
    }
}

fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn info_bytes(name: &str, piece_length: u32, content: &[u8]) -> Vec<u8> {
    let mut blob = Vec::new();
    for chunk in content.chunks(piece_length as usize) {
        let mut hasher = Sha1::new();
        hasher.update(chunk);
        blob.extend_from_slice(&hasher.finalize());
    }
    let mut map = BTreeMap::new();
    map.insert(Bytes::from_static(b"length"), Value::Integer(content.len() as i64));
    map.insert(Bytes::from_static(b"name"), Value::string(name));
    map.insert(
        Bytes::from_static(b"piece length"),
        Value::Integer(piece_length as i64),
    );
    map.insert(Bytes::from_static(b"pieces"), Value::Bytes(Bytes::from(blob)));
    encode(&Value::Dict(map))
}

/// 32 KiB of content as two single-block pieces.
fn two_piece_setup() -> (Vec<u8>, Descriptor) {
    let data = content(32768);
    let info = info_bytes("data.bin", 16384, &data);
    (data, Descriptor::from_info_bytes(&info).unwrap())
}

fn drain(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn join_swarm(session: &mut Session, conn: u64) {
    session
        .handle_link_event(conn, LinkEvent::Bitfield(Bytes::from_static(&[0xc0])))
        .await;
    session.handle_link_event(conn, LinkEvent::UnchokedUs).await;
}

fn block_event(data: &[u8], piece: u32) -> LinkEvent {
    let start = piece as usize * 16384;
    LinkEvent::Block {
        piece,
        offset: 0,
        data: Bytes::copy_from_slice(&data[start..start + 16384]),
    }
}

#[tokio::test]
async fn two_connections_complete_a_download_once() {
    let (data, descriptor) = two_piece_setup();
    let (mut session, mut rx) = Session::from_descriptor(descriptor, SessionOptions::default());

    let (link1, log1) = FakeLink::new();
    let (link2, log2) = FakeLink::new();
    let conn1 = session.attach_peer(Box::new(link1));
    let conn2 = session.attach_peer(Box::new(link2));

    join_swarm(&mut session, conn1).await;
    join_swarm(&mut session, conn2).await;

    // The first connection claimed both blocks; the second, idle with
    // two pieces missing, entered endgame and doubled both requests.
    assert_eq!(log1.lock().unwrap().requested.len(), 2);
    assert_eq!(log2.lock().unwrap().requested.len(), 2);

    session.handle_link_event(conn2, block_event(&data, 1)).await;
    session.handle_link_event(conn1, block_event(&data, 0)).await;
    // Late endgame duplicates of both blocks.
    session.handle_link_event(conn1, block_event(&data, 1)).await;
    session.handle_link_event(conn2, block_event(&data, 0)).await;

    assert!(session.is_complete());
    assert_eq!(session.downloaded(), 32768);

    let events = drain(&mut rx);
    let verified = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::PieceVerified(_)))
        .count();
    let completed = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::DownloadComplete))
        .count();
    assert_eq!(verified, 2);
    assert_eq!(completed, 1);

    // Every verified piece was announced on both links.
    assert_eq!(log1.lock().unwrap().haves, vec![1, 0]);
    assert_eq!(log2.lock().unwrap().haves, vec![1, 0]);
}

#[tokio::test]
async fn hash_mismatch_triggers_a_silent_redownload() {
    let (data, descriptor) = two_piece_setup();
    let (mut session, mut rx) = Session::from_descriptor(descriptor, SessionOptions::default());

    let (link, log) = FakeLink::new();
    let conn = session.attach_peer(Box::new(link));
    join_swarm(&mut session, conn).await;

    session
        .handle_link_event(
            conn,
            LinkEvent::Block {
                piece: 0,
                offset: 0,
                data: Bytes::from(vec![0xee; 16384]),
            },
        )
        .await;

    // Nothing surfaced, and the refill re-requested the reset block.
    assert!(drain(&mut rx).is_empty());
    assert_eq!(session.downloaded(), 0);
    let rerequested = log
        .lock()
        .unwrap()
        .requested
        .iter()
        .filter(|r| r.piece == 0)
        .count();
    assert_eq!(rerequested, 2);

    session.handle_link_event(conn, block_event(&data, 0)).await;
    assert_eq!(session.downloaded(), 16384);
    assert!(matches!(
        drain(&mut rx).first(),
        Some(SessionEvent::PieceVerified(0))
    ));
}

#[tokio::test]
async fn fingerprint_session_converges_on_the_seeded_descriptor() {
    let (_, descriptor) = two_piece_setup();
    let info = descriptor.raw_info().clone();
    let (mut session, mut rx) =
        Session::from_fingerprint(descriptor.fingerprint(), SessionOptions::default());

    assert_eq!(session.phase(), BootstrapPhase::NoDescriptor);
    let (link, log) = FakeLink::with_metadata();
    let conn = session.attach_peer(Box::new(link));
    assert_eq!(session.phase(), BootstrapPhase::Pending);
    assert_eq!(log.lock().unwrap().fetches, 1);

    // A candidate that does not parse is an error, not a fatality.
    session
        .handle_link_event(conn, LinkEvent::MetadataReceived(Bytes::from_static(b"garbage")))
        .await;
    assert!(matches!(
        drain(&mut rx).first(),
        Some(SessionEvent::Error(SessionError::Descriptor(_)))
    ));
    assert_eq!(session.phase(), BootstrapPhase::Pending);

    // A well-formed candidate with the wrong fingerprint is ignored.
    let wrong = info_bytes("other.bin", 16384, &content(16384));
    session
        .handle_link_event(conn, LinkEvent::MetadataReceived(Bytes::from(wrong)))
        .await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(session.phase(), BootstrapPhase::Pending);

    // The matching candidate wins and flips the connection to exchange.
    session
        .handle_link_event(conn, LinkEvent::MetadataReceived(info.clone()))
        .await;
    assert!(matches!(
        drain(&mut rx).first(),
        Some(SessionEvent::MetadataReady)
    ));
    assert_eq!(session.phase(), BootstrapPhase::Ready);
    assert_eq!(session.descriptor().unwrap().as_ref(), &descriptor);
    assert_eq!(session.name(), Some("data.bin"));
    assert_eq!(log.lock().unwrap().bitfields.len(), 1);
    assert_eq!(log.lock().unwrap().interested, 1);

    // Later candidates are no-ops.
    session
        .handle_link_event(conn, LinkEvent::MetadataReceived(info))
        .await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn bitfield_before_descriptor_is_replayed() {
    let (data, descriptor) = two_piece_setup();
    let info = descriptor.raw_info().clone();
    let (mut session, _rx) =
        Session::from_fingerprint(descriptor.fingerprint(), SessionOptions::default());

    let (link, log) = FakeLink::with_metadata();
    let conn = session.attach_peer(Box::new(link));

    // Bitfield and unchoke arrive while we still have no piece count.
    session
        .handle_link_event(conn, LinkEvent::Bitfield(Bytes::from_static(&[0xc0])))
        .await;
    session.handle_link_event(conn, LinkEvent::UnchokedUs).await;
    assert!(log.lock().unwrap().requested.is_empty());

    session
        .handle_link_event(conn, LinkEvent::MetadataReceived(info))
        .await;

    // The held bitfield was inflated and the window filled.
    assert_eq!(log.lock().unwrap().requested.len(), 2);

    session.handle_link_event(conn, block_event(&data, 0)).await;
    assert_eq!(session.downloaded(), 16384);
}

#[tokio::test]
async fn oversized_requests_disconnect_the_peer() {
    let (_, descriptor) = two_piece_setup();
    let (mut session, _rx) = Session::from_descriptor(descriptor, SessionOptions::default());

    let (link, log) = FakeLink::new();
    let conn = session.attach_peer(Box::new(link));
    session
        .handle_link_event(
            conn,
            LinkEvent::Request {
                piece: 0,
                offset: 0,
                length: 200_000,
            },
        )
        .await;

    assert!(log.lock().unwrap().disconnected);
    assert!(log.lock().unwrap().sent.is_empty());
    assert_eq!(session.peer_count(), 0);
}

#[tokio::test]
async fn interest_is_granted_and_only_verified_pieces_served() {
    let (data, descriptor) = two_piece_setup();
    let (mut session, _rx) = Session::from_descriptor(descriptor, SessionOptions::default());

    let (link, log) = FakeLink::new();
    let conn = session.attach_peer(Box::new(link));
    join_swarm(&mut session, conn).await;
    session.handle_link_event(conn, block_event(&data, 0)).await;

    session.handle_link_event(conn, LinkEvent::Interested).await;
    assert_eq!(log.lock().unwrap().granted, 1);

    session
        .handle_link_event(conn, LinkEvent::Request { piece: 0, offset: 0, length: 16384 })
        .await;
    session
        .handle_link_event(conn, LinkEvent::Request { piece: 1, offset: 0, length: 16384 })
        .await;

    let log = log.lock().unwrap();
    assert_eq!(log.sent.len(), 1);
    assert_eq!(log.sent[0].0, 0);
    assert_eq!(log.sent[0].2.as_ref(), &data[..16384]);
    assert_eq!(log.rejected, vec![(1, 0, 16384)]);
    drop(log);
    assert_eq!(session.uploaded(), 16384);
}

#[tokio::test]
async fn metadata_deadline_is_reported_once() {
    let (_, descriptor) = two_piece_setup();
    let options = SessionOptions {
        metadata_deadline: Some(Duration::ZERO),
        ..SessionOptions::default()
    };
    let (mut session, mut rx) = Session::from_fingerprint(descriptor.fingerprint(), options);

    // No fetch started yet, so no deadline is running.
    session.check_deadline();
    assert!(drain(&mut rx).is_empty());

    let (link, _log) = FakeLink::with_metadata();
    session.attach_peer(Box::new(link));
    session.check_deadline();
    session.check_deadline();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        SessionEvent::Error(SessionError::MetadataDeadline)
    ));
}

#[tokio::test]
async fn teardown_returns_claims_and_disconnects() {
    let (_, descriptor) = two_piece_setup();
    let (mut session, _rx) = Session::from_descriptor(descriptor, SessionOptions::default());

    let (link1, log1) = FakeLink::new();
    let conn1 = session.attach_peer(Box::new(link1));
    join_swarm(&mut session, conn1).await;
    assert_eq!(log1.lock().unwrap().requested.len(), 2);

    // Removing the peer frees its claims for the next connection.
    session.remove_peer(conn1);
    assert!(log1.lock().unwrap().disconnected);

    let (link2, log2) = FakeLink::new();
    let conn2 = session.attach_peer(Box::new(link2));
    join_swarm(&mut session, conn2).await;
    assert_eq!(log2.lock().unwrap().requested.len(), 2);

    session.destroy();
    assert!(log2.lock().unwrap().disconnected);
    assert_eq!(session.peer_count(), 0);
}
