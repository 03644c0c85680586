use crate::error::BmsError;

/// Byte value marking the end of a response frame (`b'w'`).
pub const FRAME_TERMINATOR: u8 = 0x77;

/// Upper bound on a single response frame. Real responses are a few dozen
/// bytes; anything larger means the device stopped terminating its frames.
pub const MAX_FRAME_LEN: usize = 1024;

/// Reassembles complete response frames from the chunked notification stream.
///
/// BLE notifications split a response over several events, so bytes are
/// appended here until the buffer ends with [`FRAME_TERMINATOR`]. Completion
/// is only checked at chunk boundaries, which is how the device actually
/// delivers its frames.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buffer: Vec<u8>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one notification chunk. Returns the completed frame exactly
    /// when the buffer now ends with the terminator, leaving the accumulator
    /// empty and ready for the next response.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>, BmsError> {
        self.buffer.extend_from_slice(chunk);

        if self.buffer.last() == Some(&FRAME_TERMINATOR) {
            return Ok(Some(std::mem::take(&mut self.buffer)));
        }

        if self.buffer.len() > MAX_FRAME_LEN {
            self.buffer.clear();
            return Err(BmsError::FrameOverflow {
                limit: MAX_FRAME_LEN,
            });
        }

        Ok(None)
    }

    /// Discard any partially accumulated bytes. Called at the start of each
    /// request cycle so a previous cycle's leftovers can't prefix the next
    /// response.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_chunks_until_terminator() {
        let mut acc = FrameAccumulator::new();
        assert_eq!(acc.push(&[0xDD, 0x03, 0x00]).unwrap(), None);
        assert_eq!(acc.push(&[0x1B, 0x17, 0x00]).unwrap(), None);
        let frame = acc.push(&[0x32, 0x77]).unwrap().unwrap();
        assert_eq!(frame, vec![0xDD, 0x03, 0x00, 0x1B, 0x17, 0x00, 0x32, 0x77]);
    }

    #[test]
    fn resumes_cleanly_after_a_completed_frame() {
        let mut acc = FrameAccumulator::new();
        acc.push(&[0x01, 0x77]).unwrap().unwrap();
        assert_eq!(acc.push(&[0x02]).unwrap(), None);
        let frame = acc.push(&[0x77]).unwrap().unwrap();
        assert_eq!(frame, vec![0x02, 0x77]);
    }

    #[test]
    fn terminator_mid_chunk_does_not_complete() {
        let mut acc = FrameAccumulator::new();
        // 0x77 appears inside the chunk but the chunk doesn't end on it
        assert_eq!(acc.push(&[0x77, 0x00]).unwrap(), None);
        let frame = acc.push(&[0x77]).unwrap().unwrap();
        assert_eq!(frame, vec![0x77, 0x00, 0x77]);
    }

    #[test]
    fn single_chunk_frame() {
        let mut acc = FrameAccumulator::new();
        let frame = acc.push(&[0xDD, 0xA5, 0x77]).unwrap().unwrap();
        assert_eq!(frame, vec![0xDD, 0xA5, 0x77]);
    }

    #[test]
    fn overflow_is_an_error_and_clears_the_buffer() {
        let mut acc = FrameAccumulator::new();
        let junk = vec![0x00u8; MAX_FRAME_LEN + 1];
        let err = acc.push(&junk).unwrap_err();
        assert!(matches!(err, BmsError::FrameOverflow { .. }));
        // the accumulator is usable again afterwards
        let frame = acc.push(&[0x01, 0x77]).unwrap().unwrap();
        assert_eq!(frame, vec![0x01, 0x77]);
    }

    #[test]
    fn reset_discards_partial_bytes() {
        let mut acc = FrameAccumulator::new();
        acc.push(&[0xAA, 0xBB]).unwrap();
        acc.reset();
        let frame = acc.push(&[0x01, 0x77]).unwrap().unwrap();
        assert_eq!(frame, vec![0x01, 0x77]);
    }
}
