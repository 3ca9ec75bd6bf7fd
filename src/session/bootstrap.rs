use crate::descriptor::{Descriptor, DescriptorError, Fingerprint};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    /// Waiting for a capable peer to fetch the description from.
    NoDescriptor,
    /// At least one fetch is in flight.
    Pending,
    /// A validated description is installed.
    Ready,
}

/// Drives description acquisition for a session started from a bare
/// fingerprint. The first candidate that parses and matches the
/// fingerprint wins; everything after is a no-op.
#[derive(Debug)]
pub struct MetadataBootstrap {
    fingerprint: Fingerprint,
    phase: BootstrapPhase,
}

impl MetadataBootstrap {
    pub fn new(fingerprint: Fingerprint) -> Self {
        MetadataBootstrap {
            fingerprint,
            phase: BootstrapPhase::NoDescriptor,
        }
    }

    /// For sessions seeded with a full descriptor up front.
    pub fn ready(fingerprint: Fingerprint) -> Self {
        MetadataBootstrap {
            fingerprint,
            phase: BootstrapPhase::Ready,
        }
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn begin_fetch(&mut self) {
        if self.phase == BootstrapPhase::NoDescriptor {
            self.phase = BootstrapPhase::Pending;
        }
    }

    /// Validates one assembled candidate. `Ok(Some)` installs the
    /// winner; `Ok(None)` means the candidate was ignored (already
    /// ready, or wrong fingerprint); `Err` is a parse failure worth
    /// reporting, after which the bootstrap keeps waiting.
    pub fn accept(&mut self, candidate: &[u8]) -> Result<Option<Arc<Descriptor>>, DescriptorError> {
        if self.phase == BootstrapPhase::Ready {
            return Ok(None);
        }
        let descriptor = Descriptor::from_info_bytes(candidate)?;
        if descriptor.fingerprint() != self.fingerprint {
            warn!(
                expected = %self.fingerprint,
                got = %descriptor.fingerprint(),
                "discarding description candidate with wrong fingerprint"
            );
            return Ok(None);
        }
        self.phase = BootstrapPhase::Ready;
        debug!(fingerprint = %self.fingerprint, "description validated");
        Ok(Some(Arc::new(descriptor)))
    }
}
