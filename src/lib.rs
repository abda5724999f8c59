//! # Lantern - A DHCPv4 Wire Codec and Server Loop
//!
//! Lantern parses DHCP datagrams into structured messages, serializes them back
//! to the exact RFC 2131 byte layout, and runs a UDP receive loop that hands
//! every parsed message to a single caller-supplied handler.
//!
//! Lantern keeps no lease state. Address assignment, pools and persistence are
//! entirely the handler's business.
//!
//! ## Features
//!
//! - Fixed-layout message codec with a TLV options block
//! - Typed accessors for the common options, opaque round-trip for the rest
//! - Asynchronous receive loop using Tokio, one task per datagram
//! - Handler swap at runtime and observable loop faults
//!
//! ## Example
//!
//! ```rust,no_run
//! use lantern::{BoxError, Message, Server, ServerConfig};
//! use std::net::Ipv4Addr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::new(Ipv4Addr::UNSPECIFIED, 67));
//!     server.register_callback(|request: Message| -> Result<Option<Message>, BoxError> {
//!         println!("Got message {:#x} from {}", request.xid, request.mac_string());
//!         Ok(None)
//!     });
//!     server.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod server;
pub mod v4;

pub use config::{Args, ServerConfig};
pub use error::{BoxError, CodecError, LanternError, OptionError};
pub use server::{Handler, Server, ServerState};
pub use v4::{Message, MessageType, OptionCode, Options};
