//! Protocol codec for encoding/decoding datagrams
//!
//! Requests are framed into a fixed 1208-byte envelope. Operation content is
//! serialized with bincode's fixed-int little-endian options, which lay out
//! `i32`/`i64`/`f32` as raw little-endian values and strings as an 8-byte
//! length followed by the UTF-8 bytes, the same layout the server reads.

use bincode::Options;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

use super::{
    Callback, Currency, OpCode, Operation, Response, Status, HEADER_SIZE, PAYLOAD_SIZE,
    REQUEST_SIZE,
};

/// Errors raised while building a request
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Request content too large: {0} bytes (max: {1})")]
    PayloadTooLarge(usize, usize),

    #[error("Datagram too large: {0} bytes (max: {1})")]
    DatagramTooLarge(usize, usize),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Errors raised while reading a datagram from the server
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Truncated reply: {0} bytes (need at least {1})")]
    Truncated(usize, usize),

    /// Never returned by the decoders; replacement happens in place and is
    /// flagged on the decoded value instead
    #[error("Reply text is not valid UTF-8, invalid sequences were replaced")]
    InvalidEncoding,
}

fn content_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

fn pack<T: Serialize>(fields: &T) -> Result<Vec<u8>, EncodeError> {
    Ok(content_options().serialize(fields)?)
}

/// Write a length-prefixed text field into `buf`
pub fn put_text(buf: &mut BytesMut, s: &str) {
    buf.put_u64_le(s.len() as u64);
    buf.put_slice(s.as_bytes());
}

/// Encode a text field: `u64_le(len) ++ utf8`
pub fn encode_text(s: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(8 + s.len());
    put_text(&mut buf, s);
    buf.to_vec()
}

/// Frame operation content into a full request datagram
///
/// The content is zero-padded to exactly [`PAYLOAD_SIZE`] bytes, so the
/// result is always [`REQUEST_SIZE`] bytes long.
pub fn encode_request(id: u32, op: OpCode, content: &[u8]) -> Result<Bytes, EncodeError> {
    if content.len() > PAYLOAD_SIZE {
        return Err(EncodeError::PayloadTooLarge(content.len(), PAYLOAD_SIZE));
    }

    let mut buf = BytesMut::with_capacity(REQUEST_SIZE);
    buf.put_u32_le(id);
    buf.put_i32_le(op.code());
    buf.put_slice(content);
    buf.put_bytes(0, PAYLOAD_SIZE - content.len());

    Ok(buf.freeze())
}

/// Reject datagrams above the send ceiling before they reach the socket
pub fn check_datagram_size(len: usize, limit: usize) -> Result<(), EncodeError> {
    if len > limit {
        return Err(EncodeError::DatagramTooLarge(len, limit));
    }
    Ok(())
}

pub fn encode_open_account(
    name: &str,
    password: &str,
    currency: Currency,
    initial_balance: f32,
) -> Result<Vec<u8>, EncodeError> {
    pack(&(name, password, initial_balance, currency))
}

pub fn encode_close_account(
    account_id: i32,
    name: &str,
    password: &str,
) -> Result<Vec<u8>, EncodeError> {
    pack(&(account_id, name, password))
}

pub fn encode_check_balance(
    account_id: i32,
    name: &str,
    password: &str,
    currency: Currency,
) -> Result<Vec<u8>, EncodeError> {
    pack(&(account_id, name, password, currency))
}

/// Deposit and withdraw share a layout; only the op code differs
pub fn encode_deposit(
    account_id: i32,
    name: &str,
    password: &str,
    currency: Currency,
    amount: f32,
) -> Result<Vec<u8>, EncodeError> {
    pack(&(account_id, name, password, currency, amount))
}

pub fn encode_withdraw(
    account_id: i32,
    name: &str,
    password: &str,
    currency: Currency,
    amount: f32,
) -> Result<Vec<u8>, EncodeError> {
    encode_deposit(account_id, name, password, currency, amount)
}

pub fn encode_transfer(
    sender_id: i32,
    name: &str,
    password: &str,
    currency: Currency,
    amount: f32,
    receiver_id: i32,
) -> Result<Vec<u8>, EncodeError> {
    pack(&(sender_id, name, password, currency, amount, receiver_id))
}

/// `amount` is the quantity to receive in `to_currency`
pub fn encode_exchange(
    account_id: i32,
    name: &str,
    password: &str,
    from_currency: Currency,
    to_currency: Currency,
    amount: f32,
) -> Result<Vec<u8>, EncodeError> {
    pack(&(account_id, name, password, from_currency, to_currency, amount))
}

pub fn encode_monitor(duration_ms: i64) -> Result<Vec<u8>, EncodeError> {
    pack(&duration_ms)
}

impl Operation {
    /// Encode the operation-specific content (before padding)
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        match self {
            Operation::Open { name, password, initial_balance, currency } => {
                encode_open_account(name, password, *currency, *initial_balance)
            }
            Operation::Close { account_id, name, password } => {
                encode_close_account(*account_id, name, password)
            }
            Operation::CheckBalance { account_id, name, password, currency } => {
                encode_check_balance(*account_id, name, password, *currency)
            }
            Operation::Deposit { account_id, name, password, currency, amount } => {
                encode_deposit(*account_id, name, password, *currency, *amount)
            }
            Operation::Withdraw { account_id, name, password, currency, amount } => {
                encode_withdraw(*account_id, name, password, *currency, *amount)
            }
            Operation::Transfer { sender_id, name, password, currency, amount, receiver_id } => {
                encode_transfer(*sender_id, name, password, *currency, *amount, *receiver_id)
            }
            Operation::Exchange {
                account_id,
                name,
                password,
                from_currency,
                to_currency,
                amount,
            } => {
                let (from, to) = (*from_currency, *to_currency);
                encode_exchange(*account_id, name, password, from, to, *amount)
            }
            Operation::Monitor { duration_ms } => encode_monitor(*duration_ms),
        }
    }

    /// Encode the full request datagram for this operation
    pub fn to_request(&self, id: u32) -> Result<Bytes, EncodeError> {
        encode_request(id, self.op_code(), &self.encode()?)
    }
}

/// Text up to the first NUL; bytes after it are padding
fn extract_text(region: &[u8]) -> (String, bool) {
    let end = region.iter().position(|&b| b == 0).unwrap_or(region.len());
    match String::from_utf8_lossy(&region[..end]) {
        Cow::Borrowed(s) => (s.to_string(), false),
        Cow::Owned(s) => (s, true),
    }
}

/// Decode a direct reply: `i32 id | i32 status | payload[..1200]`
///
/// The payload may be shorter than a full envelope; whatever is present is used.
pub fn decode_response(data: &[u8]) -> Result<Response, DecodeError> {
    if data.len() < HEADER_SIZE {
        return Err(DecodeError::Truncated(data.len(), HEADER_SIZE));
    }

    let mut buf = data;
    let id = buf.get_u32_le();
    let status = Status::from_code(buf.get_i32_le());
    let region = &buf[..buf.len().min(PAYLOAD_SIZE)];
    let (message, lossy) = extract_text(region);

    Ok(Response { id, status, message, lossy })
}

/// Decode a pushed update; the whole datagram is payload
pub fn decode_callback(data: &[u8]) -> Callback {
    let (message, lossy) = extract_text(data);
    Callback { message, lossy }
}
