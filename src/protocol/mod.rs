//! Protocol module - Defines the wire protocol spoken with the bank server
//!
//! Every datagram uses a fixed little-endian layout:
//! - Request: 4 bytes request id, 4 bytes op code, 1200 bytes payload
//! - Response: 4 bytes response id, 4 bytes status code, up to 1200 bytes payload
//! - Callback: payload only, no header
//!
//! Text fields inside a payload are an 8-byte length followed by raw UTF-8.

mod message;
mod codec;

pub use message::*;
pub use codec::*;

/// Size of the fixed payload block carried by every request
pub const PAYLOAD_SIZE: usize = 1200;

/// Header size: id(4) + op/status code(4) = 8 bytes
pub const HEADER_SIZE: usize = 8;

/// Total size of an encoded request datagram
pub const REQUEST_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE;

/// Largest datagram the client will ever transmit
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Default UDP port of the bank server
pub const DEFAULT_PORT: u16 = 8080;
