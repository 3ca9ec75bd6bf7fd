//! Session orchestration: one download, many peer connections.
//!
//! The wire layer hands each connection to the session as a
//! [`PeerLink`] plus a stream of [`LinkEvent`]s; the session binds it
//! to a [`PeerAdapter`], which drives the scheduler and store. All
//! state mutation funnels through [`Session::handle_link_event`], so a
//! single task driving the session needs no locking. Lifecycle
//! milestones go out as [`SessionEvent`]s over the channel returned at
//! construction.

mod adapter;
mod bootstrap;
mod error;
mod event;
mod manager;
mod progress;

pub use adapter::{AdapterMode, PeerAdapter};
pub use bootstrap::{BootstrapPhase, MetadataBootstrap};
pub use error::SessionError;
pub use event::{DiscoverySink, LinkCapabilities, LinkEvent, PeerLink, SessionEvent};
pub use manager::{Session, SessionOptions, StorageKind};
pub use progress::ThroughputWindow;

#[cfg(test)]
mod tests;
