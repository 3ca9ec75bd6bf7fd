//! Content descriptors: the parsed description of a downloadable item.
//!
//! A descriptor carries everything the storage and scheduling layers
//! need — piece geometry, expected piece digests, the file table — and
//! is identified swarm-wide by its [`Fingerprint`], the SHA-1 digest of
//! the serialized info dictionary. A session can start from a full
//! descriptor or from a bare fingerprint (e.g. out of a [`MagnetUri`])
//! and bootstrap the rest from peers.

mod error;
mod fingerprint;
mod magnet;
mod parse;

pub use error::DescriptorError;
pub use fingerprint::Fingerprint;
pub use magnet::MagnetUri;
pub use parse::{Descriptor, FileEntry};
