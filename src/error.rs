use crate::network::SocketError;
use std::{error::Error as StdError, io};
use thiserror::Error;

/// Boxed error type returned by message handlers.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors raised while decoding a DHCP message from the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("short read: need at least {needed} bytes, got {actual}")]
    ShortRead { needed: usize, actual: usize },

    #[error("unsupported hardware address length {0}, only 6 is supported")]
    UnsupportedHardwareLength(u8),

    #[error("incorrect magic cookie, expected {expected:#010x} got {actual:#010x}")]
    InvalidCookie { expected: u32, actual: u32 },
}

/// Errors raised by the typed option accessors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionError {
    #[error("option {0} not present")]
    NotPresent(u8),

    #[error("option {code} too short: need {needed} bytes, got {actual}")]
    ShortRead {
        code: u8,
        needed: usize,
        actual: usize,
    },

    #[error("unknown DHCP message type {0}")]
    UnknownMessageType(u8),
}

#[derive(Error, Debug)]
pub enum LanternError {
    #[error("Socket operation failed: {0}")]
    Socket(#[from] SocketError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to decode DHCP message: {0}")]
    Codec(#[from] CodecError),

    #[error("Message handler failed: {0}")]
    Handler(#[source] BoxError),

    #[error("Receive loop task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
