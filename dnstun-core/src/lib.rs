//! Core library for the dnstun tunnel.
//!
//! dnstun carries arbitrary IP traffic captured from a TUN interface through
//! UDP datagrams disguised as DNS-like messages and reassembles it on the far
//! end. The protocol is best-effort, single-peer, and in-order-assumed: no
//! encryption, no retransmission, no sequence numbers.
//!
//! # Architecture
//!
//! - `proto`: frame type, wire-format trait, and the pseudo-DNS codec
//! - `frag`: fragmentation of blocks into bounded frames and reassembly
//! - `transport`: the single-peer UDP endpoint with peer-learning
//! - `tun`: virtual interface contract and the Linux TUN implementation
//! - `engine`: the two concurrent relay loops
//! - `config`: configuration types shared with the binary

pub mod config;
pub mod engine;
pub mod frag;
pub mod proto;
pub mod transport;
pub mod tun;

pub use engine::TunnelEngine;
pub use frag::Fragmenter;
pub use proto::{ControlKind, Frame, FrameKind, PseudoDns, WireFormat};
