use crate::descriptor::DescriptorError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("no validated description arrived within the deadline")]
    MetadataDeadline,

    #[error("listening failed: {0}")]
    Listen(String),
}
