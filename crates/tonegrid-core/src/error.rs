//! Error types for tonegrid

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TonegridError {
    #[error("Invalid tempo: {0} BPM")]
    InvalidTempo(f64),
    #[error("Invalid modulation ratio: {0}")]
    InvalidRatio(f64),
}

pub type Result<T> = std::result::Result<T, TonegridError>;
