//! DHCPv4 message layout (RFC 2131 §2)
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +---------------+---------------+---------------+---------------+
//! |     op (1)    |   htype (1)   |   hlen (1)    |   hops (1)    |
//! +---------------+---------------+---------------+---------------+
//! |                            xid (4)                            |
//! +-------------------------------+-------------------------------+
//! |           secs (2)            |           flags (2)           |
//! +-------------------------------+-------------------------------+
//! |                  ciaddr / yiaddr / siaddr / giaddr            |
//! +---------------------------------------------------------------+
//! |                          chaddr (16)                          |
//! +---------------------------------------------------------------+
//! |                          sname (64)                           |
//! +---------------------------------------------------------------+
//! |                          file (128)                           |
//! +---------------------------------------------------------------+
//! |                      magic cookie (4)                         |
//! +---------------------------------------------------------------+
//! |                       options (variable)                      |
//! +---------------------------------------------------------------+
//! ```
//!
//! Only Ethernet addressing is supported: `hlen` must be 6. The six hardware
//! address bytes sit at the front of the 16-byte `chaddr` field and the rest
//! of the field is zero on the wire.

use super::options::Options;
use crate::error::CodecError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;

/// Marks the start of the options section.
pub const MAGIC_COOKIE: u32 = 0x6382_5363;

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;
pub const HTYPE_ETHERNET: u8 = 1;
pub const HLEN_ETHERNET: u8 = 6;

/// Broadcast bit of the `flags` field.
pub const FLAG_BROADCAST: u16 = 0x8000;

const CHADDR_SIZE: usize = 16;
const SNAME_SIZE: usize = 64;
const FILE_SIZE: usize = 128;

/// Fixed header length, up to and including `file`.
pub const HEADER_SIZE: usize = 236;
const OPTIONS_OFFSET: usize = HEADER_SIZE + 4;

/// Legacy BOOTP minimum; shorter messages are zero padded.
pub const MIN_MESSAGE_SIZE: usize = 272;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 6],
    /// Server host name. Encoded into 64 bytes; longer names are cut.
    pub sname: String,
    /// Boot file name. Encoded into 128 bytes; longer names are cut.
    pub file: String,
    pub options: Options,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            op: 0,
            htype: 0,
            hlen: 0,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0; 6],
            sname: String::new(),
            file: String::new(),
            options: Options::new(),
        }
    }
}

impl Message {
    /// An empty message with zeroed addresses and no options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a BOOTREPLY to `request`.
    ///
    /// Transaction id, flags, relay address and the client hardware address
    /// are carried over; every other field is left for the handler to fill.
    pub fn reply(request: &Message) -> Self {
        Self {
            op: BOOTREPLY,
            htype: request.htype,
            hlen: request.hlen,
            xid: request.xid,
            flags: request.flags,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            ..Self::default()
        }
    }

    /// Parses a datagram payload.
    ///
    /// The magic cookie is mandatory, so anything shorter than 240 bytes is
    /// rejected as a short read.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() < HEADER_SIZE {
            return Err(CodecError::ShortRead {
                needed: HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let op = buf.get_u8();
        let htype = buf.get_u8();
        let hlen = buf.get_u8();
        let hops = buf.get_u8();

        if hlen != HLEN_ETHERNET {
            return Err(CodecError::UnsupportedHardwareLength(hlen));
        }

        let xid = buf.get_u32();
        let secs = buf.get_u16();
        let flags = buf.get_u16();
        let ciaddr = Ipv4Addr::from(buf.get_u32());
        let yiaddr = Ipv4Addr::from(buf.get_u32());
        let siaddr = Ipv4Addr::from(buf.get_u32());
        let giaddr = Ipv4Addr::from(buf.get_u32());

        let mut chaddr = [0u8; 6];
        chaddr.copy_from_slice(&buf[..6]);
        buf.advance(CHADDR_SIZE);

        let sname = trim_field(&buf[..SNAME_SIZE]);
        buf.advance(SNAME_SIZE);
        let file = trim_field(&buf[..FILE_SIZE]);
        buf.advance(FILE_SIZE);

        if buf.remaining() < 4 {
            return Err(CodecError::ShortRead {
                needed: OPTIONS_OFFSET,
                actual: data.len(),
            });
        }
        let cookie = buf.get_u32();
        if cookie != MAGIC_COOKIE {
            return Err(CodecError::InvalidCookie {
                expected: MAGIC_COOKIE,
                actual: cookie,
            });
        }

        Ok(Self {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options: Options::decode(buf),
        })
    }

    /// Serializes the message into its wire form, at least 272 bytes long.
    pub fn encode(&self) -> Bytes {
        let len = OPTIONS_OFFSET + self.options.encoded_len();
        let mut buf = BytesMut::with_capacity(len.max(MIN_MESSAGE_SIZE));

        buf.put_u8(self.op);
        buf.put_u8(self.htype);
        buf.put_u8(self.hlen);
        buf.put_u8(self.hops);
        buf.put_u32(self.xid);
        buf.put_u16(self.secs);
        buf.put_u16(self.flags);
        buf.put_slice(&self.ciaddr.octets());
        buf.put_slice(&self.yiaddr.octets());
        buf.put_slice(&self.siaddr.octets());
        buf.put_slice(&self.giaddr.octets());

        put_field(&mut buf, &self.chaddr, CHADDR_SIZE);
        put_field(&mut buf, self.sname.as_bytes(), SNAME_SIZE);
        put_field(&mut buf, self.file.as_bytes(), FILE_SIZE);

        buf.put_u32(MAGIC_COOKIE);
        self.options.encode_into(&mut buf);

        if buf.len() < MIN_MESSAGE_SIZE {
            buf.resize(MIN_MESSAGE_SIZE, 0);
        }

        buf.freeze()
    }

    pub fn is_broadcast(&self) -> bool {
        self.flags & FLAG_BROADCAST != 0
    }

    /// Formats the hardware address as `aa:bb:cc:dd:ee:ff`.
    pub fn mac_string(&self) -> String {
        self.chaddr
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// Writes `value` into a fixed-width field, cutting or zero padding it.
fn put_field(buf: &mut BytesMut, value: &[u8], width: usize) {
    let n = value.len().min(width);
    buf.put_slice(&value[..n]);
    buf.put_bytes(0, width - n);
}

fn trim_field(field: &[u8]) -> String {
    let end = field.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&field[..end]).into_owned()
}
