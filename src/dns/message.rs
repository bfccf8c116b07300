//! # DNS Message Codec
//!
//! Builds raw A-record queries and parses the single-answer responses the
//! comparison resolver cares about, following the wire layout of
//! [RFC 1035](https://datatracker.ietf.org/doc/html/rfc1035).
//!
//! This module performs no network I/O. It provides:
//!
//! - [`DnsQuery`] — an encoded query message (header, question name as
//!   length-prefixed labels, TYPE/CLASS trailer) with a randomly generated
//!   transaction id.
//! - [`decode_answer`] — validation and extraction of the first `A` answer
//!   from a response datagram, classified through [`DecodeError`] when the
//!   message deviates from the shape this client understands.
//!
//! The decoder is deliberately narrow: it accepts exactly one question, and
//! the first answer's owner name must be the two-byte compression pointer
//! `0xC00C` back to the question name. Responses that need a general
//! decompression walk are rejected rather than half-parsed, since a client
//! comparing answers across servers must not guess at a record it did not
//! fully understand.
//!
//! ## Example
//! ```rust,no_run
//! use dnsdiff::dns::message::{DnsQuery, decode_answer};
//!
//! let query = DnsQuery::new("example.com");
//! assert!(query.bytes().len() > 12); // header + question
//! // ... send query.bytes() over UDP, receive `response` ...
//! # let response: Vec<u8> = Vec::new();
//! let _outcome = decode_answer(&response, query.id());
//! ```

use std::error::Error;
use std::fmt::Display;
use std::net::Ipv4Addr;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Size of the fixed DNS message header.
pub const HEADER_LEN: usize = 12;

/// QTYPE for a host address record.
const TYPE_A: u16 = 1;
/// QCLASS for the Internet.
const CLASS_IN: u16 = 1;

/// Generates a random 16-bit transaction id for a DNS query.
///
/// A fresh unpredictable id per query, verified against the response, keeps
/// the client from accepting stale or spoofed datagrams.
pub(crate) fn generate_id() -> u16 {
    let mut thread_rng = rand::rng();
    let mut rng = SmallRng::from_rng(&mut thread_rng);

    rng.random::<u16>()
}

/// An encoded A-record query, ready to send over UDP.
///
/// The message is built once and never mutated: a 12-byte header with the
/// recursion-desired flag and a question count of one, the domain name as a
/// sequence of length-prefixed labels ending in the zero label, and the
/// 4-byte TYPE `A` / CLASS `IN` trailer.
///
/// Domain names are passed through as-is. An empty label or a label longer
/// than 63 bytes yields a malformed message the server will refuse, not an
/// error here; callers are expected to hand in a sane name.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsQuery {
    id: u16,
    bytes: Vec<u8>,
}

impl DnsQuery {
    /// Encodes a recursive A-record query for `domain` with a random id.
    pub fn new(domain: &str) -> DnsQuery {
        let id = generate_id();
        let header = HeaderSection {
            id,
            flags: DnsHeaderFlags {
                qr: false,
                opcode: 0,
                aa: false,
                tc: false,
                rd: true,
                ra: false,
                z: 0,
                rcode: 0,
            }
            .to_u16(),
            qd_count: 1,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        };

        let mut bytes = Vec::with_capacity(HEADER_LEN + domain.len() + 6);
        bytes.extend_from_slice(&header.to_bytes());
        for label in domain.split('.') {
            bytes.push(label.len() as u8);
            bytes.extend_from_slice(label.as_bytes());
        }
        bytes.push(0);
        bytes.extend_from_slice(&TYPE_A.to_be_bytes());
        bytes.extend_from_slice(&CLASS_IN.to_be_bytes());

        DnsQuery { id, bytes }
    }

    /// The encoded message.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The transaction id carried in the header.
    ///
    /// The matching response must echo this id; see [`decode_answer`].
    pub fn id(&self) -> u16 {
        self.id
    }
}

/// The header section of a DNS message (RFC 1035 §4.1.1).
///
/// Queries set `id`, `flags`, and `qd_count`; decoding consults `id`,
/// `flags`, and `an_count`. The authority and additional counts are carried
/// only so the 12-byte layout round-trips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HeaderSection {
    /// Identifier to match requests and responses.
    pub(crate) id: u16,
    /// Flags and control bits, see [`DnsHeaderFlags`].
    pub(crate) flags: u16,
    pub(crate) qd_count: u16,
    pub(crate) an_count: u16,
    pub(crate) ns_count: u16,
    pub(crate) ar_count: u16,
}

#[allow(clippy::wrong_self_convention)]
impl HeaderSection {
    /// Converts the header into a 12-byte array suitable for transmission.
    pub(crate) fn to_bytes(&self) -> [u8; 12] {
        let mut bytes = [0u8; 12];
        bytes[0..2].copy_from_slice(&self.id.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.flags.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.qd_count.to_be_bytes());
        bytes[6..8].copy_from_slice(&self.an_count.to_be_bytes());
        bytes[8..10].copy_from_slice(&self.ns_count.to_be_bytes());
        bytes[10..12].copy_from_slice(&self.ar_count.to_be_bytes());
        bytes
    }

    /// Reads the header back out of the first 12 bytes of a message.
    pub(crate) fn from_bytes(bytes: &[u8; 12]) -> HeaderSection {
        HeaderSection {
            id: u16::from_be_bytes([bytes[0], bytes[1]]),
            flags: u16::from_be_bytes([bytes[2], bytes[3]]),
            qd_count: u16::from_be_bytes([bytes[4], bytes[5]]),
            an_count: u16::from_be_bytes([bytes[6], bytes[7]]),
            ns_count: u16::from_be_bytes([bytes[8], bytes[9]]),
            ar_count: u16::from_be_bytes([bytes[10], bytes[11]]),
        }
    }
}

/// The 16-bit DNS flags field (RFC 1035 §4.1.1).
///
/// Encoding only ever sets `rd`; decoding only ever reads `qr` and `rcode`.
/// The remaining bits are modeled so the field packs and unpacks without
/// masking constants scattered through the codec.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DnsHeaderFlags {
    /// Query/Response flag; set on every message a server sends back.
    pub(crate) qr: bool,
    pub(crate) opcode: u8,
    pub(crate) aa: bool,
    pub(crate) tc: bool,
    /// Recursion Desired; queries ask the server to chase the answer.
    pub(crate) rd: bool,
    pub(crate) ra: bool,
    pub(crate) z: u8,
    /// Response code; non-zero means the server reported a failure.
    pub(crate) rcode: u8,
}

impl DnsHeaderFlags {
    /// Encode the flags into a 16-bit integer.
    pub(crate) fn to_u16(self) -> u16 {
        ((self.qr as u16) << 15)
            | ((self.opcode as u16 & 0b1111) << 11)
            | ((self.aa as u16) << 10)
            | ((self.tc as u16) << 9)
            | ((self.rd as u16) << 8)
            | ((self.ra as u16) << 7)
            | ((self.z as u16 & 0b111) << 4)
            | (self.rcode as u16 & 0b1111)
    }

    /// Decode from a 16-bit integer into structured flags.
    pub(crate) fn from_u16(value: u16) -> Self {
        Self {
            qr: (value >> 15) & 1 != 0,
            opcode: ((value >> 11) & 0b1111) as u8,
            aa: (value >> 10) & 1 != 0,
            tc: (value >> 9) & 1 != 0,
            rd: (value >> 8) & 1 != 0,
            ra: (value >> 7) & 1 != 0,
            z: ((value >> 4) & 0b111) as u8,
            rcode: (value & 0b1111) as u8,
        }
    }
}

/// Extracts the IPv4 address of the first `A` answer in `response`.
///
/// Validation runs in order and stops at the first violation:
///
/// 1. The message carries at least the 12-byte header, else
///    [`DecodeError::Truncated`].
/// 2. The header id equals `expected_id`, else [`DecodeError::IdMismatch`].
/// 3. The QR bit is set (the message is a response), else
///    [`DecodeError::NotAResponse`].
/// 4. The RCODE nibble is zero, else [`DecodeError::ServerError`].
/// 5. The answer count is at least one, else [`DecodeError::NoAnswer`].
/// 6. The echoed question is skipped (labels until the zero label, then the
///    4-byte QTYPE/QCLASS); the first answer's name must be the compression
///    pointer `0xC00C` back to offset 12, else
///    [`DecodeError::UnsupportedAnswerFormat`]. The 12-byte
///    NAME/TYPE/CLASS/TTL/RDLENGTH prefix is then skipped and the next
///    4 bytes are returned as the address.
///
/// Any bounds violation during the walk is [`DecodeError::Truncated`].
/// Answers beyond the first are ignored.
pub fn decode_answer(response: &[u8], expected_id: u16) -> Result<Ipv4Addr, DecodeError> {
    if response.len() < HEADER_LEN {
        return Err(DecodeError::Truncated);
    }
    let mut header_bytes = [0u8; HEADER_LEN];
    header_bytes.copy_from_slice(&response[..HEADER_LEN]);
    let header = HeaderSection::from_bytes(&header_bytes);

    if header.id != expected_id {
        return Err(DecodeError::IdMismatch {
            expected: expected_id,
            got: header.id,
        });
    }

    let flags = DnsHeaderFlags::from_u16(header.flags);
    if !flags.qr {
        return Err(DecodeError::NotAResponse);
    }
    if flags.rcode != 0 {
        return Err(DecodeError::ServerError(flags.rcode));
    }
    if header.an_count == 0 {
        return Err(DecodeError::NoAnswer);
    }

    // Skip the echoed question: labels until the zero label, then QTYPE/QCLASS.
    let mut pos = HEADER_LEN;
    loop {
        let len = *response.get(pos).ok_or(DecodeError::Truncated)? as usize;
        pos += 1;
        if len == 0 {
            break;
        }
        pos += len;
    }
    pos += 4;

    let name = response
        .get(pos..pos + 2)
        .ok_or(DecodeError::Truncated)?;
    if name != [0xC0, 0x0C] {
        return Err(DecodeError::UnsupportedAnswerFormat);
    }
    // NAME(2) + TYPE(2) + CLASS(2) + TTL(4) + RDLENGTH(2)
    pos += 12;

    let rdata = response
        .get(pos..pos + 4)
        .ok_or(DecodeError::Truncated)?;
    Ok(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]))
}

/// Ways a response datagram can fail validation in [`decode_answer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The message is shorter than the layout requires at some parse step.
    Truncated,
    /// The header id does not echo the id of the query that was sent.
    IdMismatch { expected: u16, got: u16 },
    /// The QR bit is clear, so the message is a query, not a response.
    NotAResponse,
    /// The server set a non-zero response code.
    ServerError(u8),
    /// The header declares zero answer records.
    NoAnswer,
    /// The first answer's name is not the `0xC00C` pointer to the question.
    UnsupportedAnswerFormat,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Truncated => {
                write!(f, "response is shorter than the DNS message layout requires")
            }
            DecodeError::IdMismatch { expected, got } => write!(
                f,
                "response id {} does not match the query id {}",
                got, expected
            ),
            DecodeError::NotAResponse => {
                write!(f, "message is not a response (QR bit is clear)")
            }
            DecodeError::ServerError(code) => {
                write!(f, "server returned response code {}", code)
            }
            DecodeError::NoAnswer => write!(f, "response contains no answer records"),
            DecodeError::UnsupportedAnswerFormat => write!(
                f,
                "first answer is not a compression pointer to the question name"
            ),
        }
    }
}

impl Error for DecodeError {}
