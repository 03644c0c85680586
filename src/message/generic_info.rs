use super::{be_i16, be_u16, require_len, strip_header};
use crate::error::BmsError;

/// A verbatim message to send which requests current, capacity, balance
/// state and temperatures.
pub const REQUEST: [u8; 7] = [0xDD, 0xA5, 0x03, 0x00, 0xFF, 0xFD, 0x77];

// Offsets into the header-stripped payload.
const OFF_CURRENT: usize = 2;
const OFF_CAPACITY_REMAINING: usize = 4;
const OFF_CAPACITY_NOMINAL: usize = 6;
const OFF_BALANCE: usize = 12;
const OFF_SENSOR_COUNT: usize = 22;
const OFF_TEMPERATURES: usize = 23;

/// Tenths-of-Kelvin value corresponding to 0 °C.
const KELVIN_OFFSET_DECI: u16 = 2731;

/// Decoded generic-info response: pack current, capacities, the cell-balance
/// bitmask and one reading per temperature sensor.
#[derive(Debug, PartialEq)]
pub struct GenericInfoMessage {
    payload: Vec<u8>,
    sensor_count: usize,
}

impl GenericInfoMessage {
    /// Decode a complete generic-info frame. The frame is validated up front
    /// so the field accessors can index without failing; a frame shorter than
    /// any field it needs is a [`BmsError::TruncatedResponse`].
    pub fn parse(frame: &[u8]) -> Result<Self, BmsError> {
        let payload = strip_header(frame)?;
        require_len(payload, OFF_TEMPERATURES)?;
        let sensor_count = payload[OFF_SENSOR_COUNT] as usize;
        require_len(payload, OFF_TEMPERATURES + sensor_count * 2)?;
        Ok(Self {
            payload: payload.to_vec(),
            sensor_count,
        })
    }

    /// Pack current in A. Negative while discharging.
    pub fn current_a(&self) -> f64 {
        be_i16(&self.payload, OFF_CURRENT) as f64 / 100.0
    }

    /// Remaining capacity in Ah.
    pub fn capacity_remaining_ah(&self) -> f64 {
        be_i16(&self.payload, OFF_CAPACITY_REMAINING) as f64 / 100.0
    }

    /// Nominal (full) capacity in Ah.
    pub fn capacity_ah(&self) -> f64 {
        be_i16(&self.payload, OFF_CAPACITY_NOMINAL) as f64 / 100.0
    }

    /// Cell-balance bitmask, one bit per cell currently balancing.
    pub fn balance(&self) -> u16 {
        be_u16(&self.payload, OFF_BALANCE)
    }

    /// One reading per temperature sensor, in °C. The wire encoding is
    /// tenths of a Kelvin.
    pub fn temperatures_c(&self) -> Vec<f64> {
        (0..self.sensor_count)
            .map(|i| {
                let raw = be_u16(&self.payload, OFF_TEMPERATURES + i * 2);
                (raw as f64 - KELVIN_OFFSET_DECI as f64) / 10.0
            })
            .collect()
    }
}
