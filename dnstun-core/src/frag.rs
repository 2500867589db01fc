//! Fragmentation and reassembly of payload blocks.
//!
//! A block read from the interface is split into consecutive data frames of
//! at most the configured part size; the receiving side concatenates frame
//! payloads back into the block, in arrival order. There is no reordering,
//! deduplication, or gap detection at this layer: the transport is trusted to
//! deliver frames in transmission order.

use std::sync::Arc;

use crate::proto::{Frame, FrameKind, WireFormat};

/// Fragmentation errors.
#[derive(Debug, thiserror::Error)]
pub enum FragError {
    #[error("part size {part} exceeds the maximum payload of {max} bytes")]
    BadPartSize { part: usize, max: usize },
}

/// Splits byte blocks into bounded data frames and joins them back.
pub struct Fragmenter {
    format: Arc<dyn WireFormat>,
    part_size: usize,
}

impl Fragmenter {
    /// Create a fragmenter using the format's maximum payload as part size.
    pub fn new(format: Arc<dyn WireFormat>) -> Self {
        Self {
            format,
            part_size: 0,
        }
    }

    /// Configure the part size. `0` means "use the format's maximum payload";
    /// anything above that maximum is rejected.
    pub fn set_part_size(&mut self, part_size: usize) -> Result<(), FragError> {
        let max = self.format.max_payload();
        if part_size > max {
            return Err(FragError::BadPartSize {
                part: part_size,
                max,
            });
        }
        self.part_size = part_size;
        Ok(())
    }

    /// Part size actually used when splitting.
    pub fn effective_part_size(&self) -> usize {
        if self.part_size == 0 {
            self.format.max_payload()
        } else {
            self.part_size
        }
    }

    /// Split `data` into an ordered sequence of data frames.
    ///
    /// The last frame may carry a shorter payload; empty input yields no
    /// frames. Output order is significant and must be preserved by the
    /// transport.
    pub fn encapsulate(&self, data: &[u8]) -> Vec<Frame> {
        let size = self.effective_part_size();
        data.chunks(size)
            .map(|chunk| {
                let mut frame = self.format.new_frame(FrameKind::Data);
                // Chunks are bounded by the part size, which never exceeds
                // the format maximum.
                frame.set_payload_unchecked(chunk.to_vec());
                frame
            })
            .collect()
    }

    /// Concatenate frame payloads back into one block, in the order given.
    pub fn decapsulate(&self, frames: &[Frame]) -> Vec<u8> {
        let total: usize = frames.iter().map(|f| f.payload().len()).sum();
        let mut data = Vec::with_capacity(total);
        for frame in frames {
            data.extend_from_slice(frame.payload());
        }
        data
    }
}
