use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Shared memory setup failed at slot {index}: {reason}")]
    SlotSetup { index: usize, reason: String },

    #[error("Handshake aborted: {0}")]
    Handshake(String),

    #[error("Peer disconnected: {0}")]
    Disconnected(String),

    #[error("Frame exceeds slot capacity: need {required} bytes, slot holds {capacity}")]
    SlotOverflow { required: usize, capacity: usize },

    #[error("Ring not ready: {0}")]
    RingNotReady(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
