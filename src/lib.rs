//! DBank - client protocol engine for a datagram-based remote banking service
//!
//! Encodes fixed-layout binary requests, decodes replies and pushed
//! callbacks, and drives request/reply timing over UDP.

pub mod config;
pub mod network;
pub mod protocol;
