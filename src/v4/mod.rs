//! DHCPv4 wire format
//!
//! This module contains the DHCPv4 codec:
//! - Message header parsing and serialization
//! - The TLV options block and typed option accessors

pub mod message;
pub mod options;


pub use message::{Message, BOOTREPLY, BOOTREQUEST, MAGIC_COOKIE, MIN_MESSAGE_SIZE};
pub use options::{ClientId, MessageType, OptionCode, Options};
