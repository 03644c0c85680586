//! Decoders for the two documented BMS response formats.
//!
//! Every response starts with a 4-byte header which carries no telemetry and
//! is stripped before field offsets apply. All multi-byte integers are
//! big-endian.

mod cell_voltages;
mod generic_info;

pub use cell_voltages::CellVoltagesMessage;
pub use cell_voltages::REQUEST as CELL_VOLTAGES_REQUEST;
pub use generic_info::GenericInfoMessage;
pub use generic_info::REQUEST as GENERIC_INFO_REQUEST;

use crate::error::BmsError;

/// Length of the status/length header preceding every response payload.
const RESPONSE_HEADER_LEN: usize = 4;

/// Drop the response header, or fail if the frame doesn't even cover it.
fn strip_header(frame: &[u8]) -> Result<&[u8], BmsError> {
    if frame.len() < RESPONSE_HEADER_LEN {
        return Err(BmsError::TruncatedResponse {
            expected: RESPONSE_HEADER_LEN,
            actual: frame.len(),
        });
    }
    Ok(&frame[RESPONSE_HEADER_LEN..])
}

fn be_u16(payload: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([payload[offset], payload[offset + 1]])
}

fn be_i16(payload: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([payload[offset], payload[offset + 1]])
}

/// Check that `payload` covers at least `expected` bytes before indexing.
fn require_len(payload: &[u8], expected: usize) -> Result<(), BmsError> {
    if payload.len() < expected {
        return Err(BmsError::TruncatedResponse {
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}
