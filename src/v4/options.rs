//! DHCP options block (RFC 2132)
//!
//! Options travel as a TLV stream: one byte code, one byte length, then the
//! value. [`Options`] keeps the raw value bytes keyed by code, so options this
//! crate does not interpret still round-trip untouched. Typed accessors decode
//! the handful of options the server cares about on demand.

use crate::error::OptionError;
use bytes::{BufMut, Bytes, BytesMut};
use std::{collections::BTreeMap, fmt, net::Ipv4Addr, time::Duration};

/// A single option code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OptionCode(pub u8);

impl OptionCode {
    pub const PAD: Self = Self(0);
    pub const SUBNET_MASK: Self = Self(1);
    pub const ROUTER: Self = Self(3);
    pub const DOMAIN_NAME_SERVER: Self = Self(6);
    pub const REQUESTED_IP_ADDRESS: Self = Self(50);
    pub const MESSAGE_TYPE: Self = Self(53);
    pub const PARAMETER_REQUEST_LIST: Self = Self(55);
    pub const RENEWAL_TIME: Self = Self(58);
    pub const REBINDING_TIME: Self = Self(59);
    pub const CLIENT_ID: Self = Self(61);
    pub const END: Self = Self(255);

    /// Pad and end are framing markers and never carry a value.
    pub fn is_marker(self) -> bool {
        self == Self::PAD || self == Self::END
    }
}

impl From<u8> for OptionCode {
    fn from(code: u8) -> Self {
        Self(code)
    }
}

impl From<OptionCode> for u8 {
    fn from(code: OptionCode) -> Self {
        code.0
    }
}

impl fmt::Display for OptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// DHCP message type carried in option 53.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = OptionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(OptionError::UnknownMessageType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discover => "DHCPDISCOVER",
            Self::Offer => "DHCPOFFER",
            Self::Request => "DHCPREQUEST",
            Self::Decline => "DHCPDECLINE",
            Self::Ack => "DHCPACK",
            Self::Nak => "DHCPNAK",
            Self::Release => "DHCPRELEASE",
            Self::Inform => "DHCPINFORM",
        };
        f.write_str(name)
    }
}

/// Client identifier (option 61): a type byte followed by the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId {
    pub kind: u8,
    pub id: Bytes,
}

/// The options of one DHCP message, keyed by code.
///
/// Only one value is kept per code; when a code repeats on the wire the last
/// occurrence wins. Iteration and encoding are in ascending code order, so two
/// sets holding the same values always encode to the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    entries: BTreeMap<OptionCode, Bytes>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans a TLV option stream.
    ///
    /// Reading is lenient: a value whose declared length runs past the end of
    /// the buffer is cut short, and running out of bytes before an end marker
    /// simply stops the scan. Nothing in the stream can make this fail.
    pub fn decode(data: &[u8]) -> Self {
        let mut options = Self::new();
        let mut index = 0;

        while index < data.len() {
            let code = OptionCode(data[index]);
            index += 1;

            if code == OptionCode::END {
                break;
            }
            if code == OptionCode::PAD {
                continue;
            }

            let Some(&length) = data.get(index) else {
                break;
            };
            index += 1;

            let end = (index + length as usize).min(data.len());
            options
                .entries
                .insert(code, Bytes::copy_from_slice(&data[index..end]));
            index = end;
        }

        options
    }

    /// Writes the options as a TLV stream terminated by the end marker.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub(crate) fn encode_into(&self, buf: &mut BytesMut) {
        for (code, value) in &self.entries {
            // The length field is a single byte.
            let value = &value[..value.len().min(u8::MAX as usize)];
            buf.put_u8(code.0);
            buf.put_u8(value.len() as u8);
            buf.put_slice(value);
        }
        buf.put_u8(OptionCode::END.0);
    }

    pub(crate) fn encoded_len(&self) -> usize {
        self.entries
            .values()
            .map(|v| 2 + v.len().min(u8::MAX as usize))
            .sum::<usize>()
            + 1
    }

    /// Stores a raw option value, replacing any previous value for `code`.
    ///
    /// Pad and end are framing markers and are ignored.
    pub fn insert(&mut self, code: impl Into<OptionCode>, value: impl Into<Bytes>) {
        let code = code.into();
        if code.is_marker() {
            tracing::debug!("Ignoring insert of framing marker option {}", code);
            return;
        }
        self.entries.insert(code, value.into());
    }

    pub fn get(&self, code: impl Into<OptionCode>) -> Option<&Bytes> {
        self.entries.get(&code.into())
    }

    pub fn remove(&mut self, code: impl Into<OptionCode>) -> Option<Bytes> {
        self.entries.remove(&code.into())
    }

    pub fn contains(&self, code: impl Into<OptionCode>) -> bool {
        self.entries.contains_key(&code.into())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OptionCode, &Bytes)> {
        self.entries.iter().map(|(code, value)| (*code, value))
    }

    fn require(&self, code: OptionCode) -> Result<&Bytes, OptionError> {
        self.entries
            .get(&code)
            .ok_or(OptionError::NotPresent(code.0))
    }

    fn require_len(&self, code: OptionCode, needed: usize) -> Result<&Bytes, OptionError> {
        let value = self.require(code)?;
        if value.len() < needed {
            return Err(OptionError::ShortRead {
                code: code.0,
                needed,
                actual: value.len(),
            });
        }
        Ok(value)
    }

    fn ipv4(&self, code: OptionCode) -> Result<Ipv4Addr, OptionError> {
        let v = self.require_len(code, 4)?;
        Ok(Ipv4Addr::new(v[0], v[1], v[2], v[3]))
    }

    fn seconds(&self, code: OptionCode) -> Result<Duration, OptionError> {
        let v = self.require_len(code, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&v[..8]);
        Ok(Duration::from_secs(u64::from_be_bytes(raw)))
    }

    /// Option 1.
    pub fn subnet_mask(&self) -> Result<Ipv4Addr, OptionError> {
        self.ipv4(OptionCode::SUBNET_MASK)
    }

    /// Option 50.
    pub fn requested_ip(&self) -> Result<Ipv4Addr, OptionError> {
        self.ipv4(OptionCode::REQUESTED_IP_ADDRESS)
    }

    /// Option 53.
    pub fn message_type(&self) -> Result<MessageType, OptionError> {
        let v = self.require_len(OptionCode::MESSAGE_TYPE, 1)?;
        MessageType::try_from(v[0])
    }

    /// Option 55, in the order the client listed the codes.
    pub fn parameter_request_list(&self) -> Result<Vec<OptionCode>, OptionError> {
        let v = self.require(OptionCode::PARAMETER_REQUEST_LIST)?;
        Ok(v.iter().copied().map(OptionCode).collect())
    }

    /// Option 58, an 8-byte big-endian count of seconds.
    pub fn renewal_time(&self) -> Result<Duration, OptionError> {
        self.seconds(OptionCode::RENEWAL_TIME)
    }

    /// Option 59, an 8-byte big-endian count of seconds.
    pub fn rebinding_time(&self) -> Result<Duration, OptionError> {
        self.seconds(OptionCode::REBINDING_TIME)
    }

    /// Option 61.
    pub fn client_id(&self) -> Result<ClientId, OptionError> {
        let v = self.require_len(OptionCode::CLIENT_ID, 2)?;
        Ok(ClientId {
            kind: v[0],
            id: v.slice(1..),
        })
    }

    pub fn set_subnet_mask(&mut self, mask: Ipv4Addr) {
        self.insert(OptionCode::SUBNET_MASK, mask.octets().to_vec());
    }

    pub fn set_requested_ip(&mut self, addr: Ipv4Addr) {
        self.insert(OptionCode::REQUESTED_IP_ADDRESS, addr.octets().to_vec());
    }

    pub fn set_message_type(&mut self, kind: MessageType) {
        self.insert(OptionCode::MESSAGE_TYPE, vec![kind as u8]);
    }

    pub fn set_parameter_request_list(&mut self, codes: &[OptionCode]) {
        let raw: Vec<u8> = codes.iter().map(|c| c.0).collect();
        self.insert(OptionCode::PARAMETER_REQUEST_LIST, raw);
    }

    pub fn set_renewal_time(&mut self, time: Duration) {
        self.insert(OptionCode::RENEWAL_TIME, time.as_secs().to_be_bytes().to_vec());
    }

    pub fn set_rebinding_time(&mut self, time: Duration) {
        self.insert(OptionCode::REBINDING_TIME, time.as_secs().to_be_bytes().to_vec());
    }

    pub fn set_client_id(&mut self, kind: u8, id: &[u8]) {
        let mut raw = BytesMut::with_capacity(1 + id.len());
        raw.put_u8(kind);
        raw.put_slice(id);
        self.insert(OptionCode::CLIENT_ID, raw.freeze());
    }
}

impl<C: Into<OptionCode>, V: Into<Bytes>> FromIterator<(C, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (code, value) in iter {
            options.insert(code, value);
        }
        options
    }
}
