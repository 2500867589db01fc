//! Wire protocol for the dnstun tunnel.
//!
//! This module defines the frame value type, the polymorphic wire-format
//! trait, and the production pseudo-DNS encoding. The wire format is the
//! on-the-wire contract between two instances of this program and must be
//! reproduced bit-exactly for interoperability.
//!
//! # Frame layout (pseudo-DNS)
//!
//! | Offset      | Bytes | Meaning                                        |
//! |-------------|-------|------------------------------------------------|
//! | 0..2        | 2     | magic number `0x14 0x1D`                       |
//! | 2           | 1     | bit 0 = kind (0 = data, 1 = control)           |
//! | 3           | 1     | low nibble = control marker                    |
//! | 4..12       | 8     | fixed field `00 01 00 00 00 00 00 00`          |
//! | 12          | 1     | payload length N (present only when N > 0)     |
//! | 13..13+N    | N     | payload (present only when N > 0)              |
//! | last 5      | 5     | fixed trailer `00 00 01 00 01`                 |
//!
//! Total frame length is exactly `12 + (N > 0 ? 1 + N : 0) + 5`.

use std::fmt;

/// Magic number identifying tunnel frames.
pub const MAGIC: [u8; 2] = [0x14, 0x1D];

/// Fixed field at offsets 4..12 of every frame.
const RESERVED: [u8; 8] = [0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Fixed trailer closing every frame.
const TRAILER: [u8; 5] = [0x00, 0x00, 0x01, 0x00, 0x01];

/// Offset of the payload length byte (when a payload is present).
const LEN_OFFSET: usize = 12;

/// Smallest valid frame: fixed header plus trailer, no payload section.
pub const MIN_FRAME_SIZE: usize = LEN_OFFSET + TRAILER.len();

/// Whether a frame carries tunneled data or a signaling marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Control,
}

impl FrameKind {
    fn bit(self) -> u8 {
        match self {
            FrameKind::Data => 0,
            FrameKind::Control => 1,
        }
    }
}

/// Control marker carried by a control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    None,
    Received,
    EndOfTransmission,
}

impl ControlKind {
    fn nibble(self) -> u8 {
        match self {
            ControlKind::None => 0,
            ControlKind::Received => 1,
            ControlKind::EndOfTransmission => 2,
        }
    }

    fn from_nibble(value: u8) -> Option<Self> {
        match value {
            0 => Some(ControlKind::None),
            1 => Some(ControlKind::Received),
            2 => Some(ControlKind::EndOfTransmission),
            _ => None,
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlKind::None => write!(f, "none"),
            ControlKind::Received => write!(f, "received"),
            ControlKind::EndOfTransmission => write!(f, "end-of-transmission"),
        }
    }
}

/// One unit of the wire protocol.
///
/// A frame is a value type: cloning produces an independent copy carrying the
/// same kind, control marker, and payload. Frames are constructed through a
/// [`WireFormat`], which fixes the payload maximum for the frame's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    control: ControlKind,
    payload: Vec<u8>,
    max_payload: usize,
}

impl Frame {
    fn new(kind: FrameKind, max_payload: usize) -> Self {
        Self {
            kind,
            control: ControlKind::None,
            payload: Vec::new(),
            max_payload,
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn control(&self) -> ControlKind {
        self.control
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Maximum payload length accepted by [`set_payload`](Self::set_payload).
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Set the control marker.
    ///
    /// A data frame must always carry [`ControlKind::None`]; assigning any
    /// other marker to it is rejected.
    pub fn set_control(&mut self, control: ControlKind) -> Result<(), ProtoError> {
        if self.kind == FrameKind::Data && control != ControlKind::None {
            return Err(ProtoError::ControlOnDataFrame);
        }
        self.control = control;
        Ok(())
    }

    /// Set the payload, rejecting anything over the format maximum.
    ///
    /// The bound is enforced here, at assignment time, so encoding a
    /// well-formed in-memory frame can never fail.
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<(), ProtoError> {
        if payload.len() > self.max_payload {
            return Err(ProtoError::PayloadTooLarge {
                len: payload.len(),
                max: self.max_payload,
            });
        }
        self.payload = payload.to_vec();
        Ok(())
    }

    /// Assign a payload already known to satisfy the format bound.
    pub(crate) fn set_payload_unchecked(&mut self, payload: Vec<u8>) {
        debug_assert!(payload.len() <= self.max_payload);
        self.payload = payload;
    }
}

/// A concrete wire encoding of [`Frame`]s.
///
/// The engine and the fragmenter depend only on this capability set, never on
/// a concrete format, so alternate wire disguises can be added without
/// touching the relay logic. Implementations are stateless descriptors;
/// constructing frames through them needs no synchronization.
pub trait WireFormat: Send + Sync {
    /// Construct a fresh frame of the given kind.
    fn new_frame(&self, kind: FrameKind) -> Frame;

    /// Maximum payload length a frame of this format may carry.
    fn max_payload(&self) -> usize;

    /// Serialize a frame to its exact byte layout. Always succeeds: the
    /// payload bound was enforced when the payload was assigned.
    fn encode(&self, frame: &Frame) -> Vec<u8>;

    /// Validate an untrusted byte buffer and decode it into a frame.
    fn decode(&self, buf: &[u8]) -> Result<Frame, ProtoError>;
}

/// The production pseudo-DNS wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct PseudoDns;

impl PseudoDns {
    /// Maximum payload carried by one pseudo-DNS frame.
    pub const MAX_PAYLOAD: usize = 63;
}

impl WireFormat for PseudoDns {
    fn new_frame(&self, kind: FrameKind) -> Frame {
        Frame::new(kind, Self::MAX_PAYLOAD)
    }

    fn max_payload(&self) -> usize {
        Self::MAX_PAYLOAD
    }

    fn encode(&self, frame: &Frame) -> Vec<u8> {
        let n = frame.payload.len();
        let payload_section = if n > 0 { 1 + n } else { 0 };
        let mut buf = Vec::with_capacity(LEN_OFFSET + payload_section + TRAILER.len());

        buf.extend_from_slice(&MAGIC);
        buf.push(frame.kind.bit());
        buf.push(frame.control.nibble());
        buf.extend_from_slice(&RESERVED);
        if n > 0 {
            buf.push(n as u8);
            buf.extend_from_slice(&frame.payload);
        }
        buf.extend_from_slice(&TRAILER);
        buf
    }

    fn decode(&self, buf: &[u8]) -> Result<Frame, ProtoError> {
        if buf.len() < MIN_FRAME_SIZE {
            return Err(ProtoError::Corrupted("frame shorter than minimum length"));
        }

        // The magic number is checked before any other structural check: a
        // mismatch means the buffer is likely not this protocol at all.
        if buf[0] != MAGIC[0] || buf[1] != MAGIC[1] {
            return Err(ProtoError::WrongMagic(buf[0], buf[1]));
        }

        if buf[2] & 0xFE != 0 || buf[3] & 0xF0 != 0 {
            return Err(ProtoError::Corrupted("reserved bits set"));
        }

        let trailer_at = buf.len() - TRAILER.len();
        if buf[4..LEN_OFFSET] != RESERVED || buf[trailer_at..] != TRAILER {
            return Err(ProtoError::Corrupted("fixed field mismatch"));
        }

        // With a payload the length byte is present at offset 12; without one
        // the trailer starts there and buf[12] reads as 0x00.
        let payload_len = buf[LEN_OFFSET] as usize;
        let expected_end = LEN_OFFSET + payload_len + 4 + usize::from(payload_len != 0);
        if expected_end != buf.len() - 1 {
            return Err(ProtoError::Corrupted("length mismatch"));
        }

        let kind = if buf[2] & 0x01 == 0 {
            FrameKind::Data
        } else {
            FrameKind::Control
        };
        let control = ControlKind::from_nibble(buf[3] & 0x0F)
            .ok_or(ProtoError::Corrupted("unknown control marker"))?;
        if kind == FrameKind::Data && control != ControlKind::None {
            return Err(ProtoError::Corrupted("control marker on a data frame"));
        }

        let mut frame = Frame::new(kind, Self::MAX_PAYLOAD);
        frame.control = control;
        frame.payload = buf[LEN_OFFSET + 1..LEN_OFFSET + 1 + payload_len].to_vec();
        Ok(frame)
    }
}

/// Protocol-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("wrong magic number: {0:#04x} {1:#04x}")]
    WrongMagic(u8, u8),

    #[error("corrupted frame: {0}")]
    Corrupted(&'static str),

    #[error("payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("control marker not allowed on a data frame")]
    ControlOnDataFrame,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANY: u8 = 0xFA;

    fn data_frame(payload: &[u8]) -> Frame {
        let mut frame = PseudoDns.new_frame(FrameKind::Data);
        frame.set_payload(payload).expect("payload within bound");
        frame
    }

    #[test]
    fn dump_data_frame_with_payload() {
        let frame = data_frame(&[ANY; 6]);

        let expected = vec![
            0x14, 0x1D, // magic number
            0x00, 0x00, // kind = data, control = none
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // fixed field
            0x06, // payload length
            ANY, ANY, ANY, ANY, ANY, ANY, // payload
            0x00, 0x00, 0x01, 0x00, 0x01, // trailer
        ];

        assert_eq!(PseudoDns.encode(&frame), expected);
    }

    #[test]
    fn dump_data_frame_without_payload_omits_length_byte() {
        let frame = PseudoDns.new_frame(FrameKind::Data);

        let expected = vec![
            0x14, 0x1D, // magic number
            0x00, 0x00, // kind = data, control = none
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // fixed field
            0x00, 0x00, 0x01, 0x00, 0x01, // trailer, no payload section
        ];

        assert_eq!(PseudoDns.encode(&frame), expected);
        assert_eq!(expected.len(), MIN_FRAME_SIZE);
    }

    #[test]
    fn dump_control_frame_end_of_transmission() {
        let mut frame = PseudoDns.new_frame(FrameKind::Control);
        frame
            .set_control(ControlKind::EndOfTransmission)
            .expect("control frame accepts any marker");

        let expected = vec![
            0x14, 0x1D, // magic number
            0x01, 0x02, // kind = control, control = end-of-transmission
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // fixed field
            0x00, 0x00, 0x01, 0x00, 0x01, // trailer
        ];

        assert_eq!(PseudoDns.encode(&frame), expected);
    }

    #[test]
    fn decode_data_frame_with_payload() {
        let wire = PseudoDns.encode(&data_frame(&[ANY; 6]));

        let frame = PseudoDns.decode(&wire).expect("valid frame");

        assert_eq!(frame.kind(), FrameKind::Data);
        assert_eq!(frame.control(), ControlKind::None);
        assert_eq!(frame.payload(), &[ANY; 6]);
    }

    #[test]
    fn decode_roundtrips_every_kind() {
        let mut control = PseudoDns.new_frame(FrameKind::Control);
        control.set_control(ControlKind::Received).unwrap();
        control.set_payload(&[0x11]).unwrap();

        for frame in [data_frame(b"hello"), data_frame(&[]), control] {
            let decoded = PseudoDns.decode(&PseudoDns.encode(&frame)).unwrap();
            assert_eq!(decoded.kind(), frame.kind());
            assert_eq!(decoded.control(), frame.control());
            assert_eq!(decoded.payload(), frame.payload());
        }
    }

    #[test]
    fn decode_rejects_wrong_magic_before_everything_else() {
        let mut wire = PseudoDns.encode(&data_frame(&[ANY; 6]));
        wire[0] = 0x34;
        // Corrupt other fields too: the magic check must still win.
        wire[5] = 0xFF;

        let err = PseudoDns.decode(&wire).unwrap_err();
        assert!(matches!(err, ProtoError::WrongMagic(0x34, 0x1D)));
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let err = PseudoDns.decode(&[0x14]).unwrap_err();
        assert!(matches!(err, ProtoError::Corrupted(_)));
    }

    #[test]
    fn decode_rejects_reserved_bits() {
        let mut wire = PseudoDns.encode(&data_frame(&[ANY; 6]));
        wire[2] |= 0x80;
        assert!(matches!(
            PseudoDns.decode(&wire),
            Err(ProtoError::Corrupted(_))
        ));

        let mut wire = PseudoDns.encode(&data_frame(&[ANY; 6]));
        wire[3] |= 0x10;
        assert!(matches!(
            PseudoDns.decode(&wire),
            Err(ProtoError::Corrupted(_))
        ));
    }

    #[test]
    fn decode_rejects_fixed_field_mismatch() {
        let mut wire = PseudoDns.encode(&data_frame(&[ANY; 6]));
        wire[5] = 0x00; // fixed field byte
        assert!(matches!(
            PseudoDns.decode(&wire),
            Err(ProtoError::Corrupted(_))
        ));

        let mut wire = PseudoDns.encode(&data_frame(&[ANY; 6]));
        let last = wire.len() - 1;
        wire[last] = 0x00; // trailer byte
        assert!(matches!(
            PseudoDns.decode(&wire),
            Err(ProtoError::Corrupted(_))
        ));
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        // Length byte claims more payload than the buffer carries.
        let mut wire = PseudoDns.encode(&data_frame(&[ANY; 6]));
        wire[12] = 0x07;
        assert!(matches!(
            PseudoDns.decode(&wire),
            Err(ProtoError::Corrupted(_))
        ));

        // ...and less.
        let mut wire = PseudoDns.encode(&data_frame(&[ANY; 6]));
        wire[12] = 0x01;
        assert!(matches!(
            PseudoDns.decode(&wire),
            Err(ProtoError::Corrupted(_))
        ));

        // One payload byte dropped from the middle.
        let mut wire = PseudoDns.encode(&data_frame(&[ANY; 6]));
        wire.remove(14);
        assert!(matches!(
            PseudoDns.decode(&wire),
            Err(ProtoError::Corrupted(_))
        ));
    }

    #[test]
    fn decode_rejects_control_marker_on_data_frame() {
        let mut wire = PseudoDns.encode(&data_frame(&[ANY; 6]));
        wire[3] = 0x02; // end-of-transmission on a data frame
        assert!(matches!(
            PseudoDns.decode(&wire),
            Err(ProtoError::Corrupted(_))
        ));
    }

    #[test]
    fn decode_rejects_unknown_control_marker() {
        let mut control = PseudoDns.new_frame(FrameKind::Control);
        control.set_control(ControlKind::Received).unwrap();
        let mut wire = PseudoDns.encode(&control);
        wire[3] = 0x0F;
        assert!(matches!(
            PseudoDns.decode(&wire),
            Err(ProtoError::Corrupted(_))
        ));
    }

    #[test]
    fn payload_bound_enforced_at_assignment() {
        let mut frame = PseudoDns.new_frame(FrameKind::Data);

        let at_max = vec![ANY; PseudoDns::MAX_PAYLOAD];
        assert!(frame.set_payload(&at_max).is_ok());

        let over_max = vec![ANY; PseudoDns::MAX_PAYLOAD + 1];
        assert!(matches!(
            frame.set_payload(&over_max),
            Err(ProtoError::PayloadTooLarge { .. })
        ));
        // The previous payload is untouched.
        assert_eq!(frame.payload().len(), PseudoDns::MAX_PAYLOAD);
    }

    #[test]
    fn control_marker_rejected_on_data_frame() {
        let mut frame = PseudoDns.new_frame(FrameKind::Data);

        assert!(matches!(
            frame.set_control(ControlKind::Received),
            Err(ProtoError::ControlOnDataFrame)
        ));
        // None is the marker a data frame already carries; allowed.
        assert!(frame.set_control(ControlKind::None).is_ok());

        let mut control = PseudoDns.new_frame(FrameKind::Control);
        assert!(control.set_control(ControlKind::Received).is_ok());
        assert!(control.set_control(ControlKind::EndOfTransmission).is_ok());
    }

    #[test]
    fn clone_is_an_independent_copy() {
        let mut original = PseudoDns.new_frame(FrameKind::Control);
        original.set_control(ControlKind::EndOfTransmission).unwrap();
        original.set_payload(&[0x11]).unwrap();

        let mut copy = original.clone();
        assert_eq!(copy, original);

        copy.set_payload(&[0x22, 0x33]).unwrap();
        assert_eq!(original.payload(), &[0x11]);
    }
}
