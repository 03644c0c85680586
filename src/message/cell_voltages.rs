use super::{be_u16, require_len, strip_header};
use crate::error::BmsError;

/// A verbatim message to send which requests per-cell voltages.
pub const REQUEST: [u8; 7] = [0xDD, 0xA5, 0x04, 0x00, 0xFF, 0xFC, 0x77];

/// Decoded cell-voltage response.
///
/// The payload is a run of 2-byte millivolt words. The final word is not a
/// cell reading (it looks like a status/checksum pair) and is excluded, so a
/// payload of W words yields W−1 cells.
#[derive(Debug, PartialEq)]
pub struct CellVoltagesMessage {
    cells_v: Vec<f64>,
}

impl CellVoltagesMessage {
    /// Decode a complete cell-voltages frame in a single pass.
    pub fn parse(frame: &[u8]) -> Result<Self, BmsError> {
        let payload = strip_header(frame)?;
        require_len(payload, 2)?;
        let words = payload.len() / 2;
        let cells_v = (0..words - 1)
            .map(|i| be_u16(payload, i * 2) as f64 / 1000.0)
            .collect();
        Ok(Self { cells_v })
    }

    /// Voltage of each cell in V, in wire order.
    pub fn cell_voltages_v(&self) -> &[f64] {
        &self.cells_v
    }

    /// Total pack voltage in V: the sum of all decoded cells.
    pub fn pack_voltage_v(&self) -> f64 {
        self.cells_v.iter().sum()
    }
}
