//! Protocol constants and tuning parameters.

use std::time::Duration;

/// Standard block request unit (16 KiB).
pub const BLOCK_SIZE: u32 = 16384;

/// Maximum length a peer may request in a single block request (128 KiB).
/// Larger requests are a protocol violation and disconnect the peer.
pub const MAX_REQUEST_LENGTH: u32 = 131072;

/// Outstanding block requests allowed per connection.
pub const MAX_OUTSTANDING_REQUESTS: usize = 5;

/// Endgame mode activates when fewer than this many pieces remain missing.
pub const ENDGAME_PIECE_THRESHOLD: usize = 30;

/// Timeout for a single block request. Expiry is a transfer failure,
/// not a connection failure.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Keep-alive interval applied to every connection.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(120);

/// Upper bound on an assembled metadata candidate (1 MiB). Candidates
/// beyond this are rejected before parsing.
pub const MAX_METADATA_SIZE: usize = 1048576;

/// Window over which recent throughput is averaged for ETA estimates.
pub const RATE_WINDOW: Duration = Duration::from_secs(5);
