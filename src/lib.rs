//! Expose telemetry from a JBD-style BLE Battery Management System to plain
//! TCP clients, or dump it to stdout.
//!
//! The BMS speaks a simple request/response protocol over a GATT write
//! characteristic and a notify characteristic. Responses arrive as chunked
//! notifications and are terminated by the byte `0x77`. Two commands are
//! documented: generic pack info (current, capacities, balance state,
//! temperatures) and per-cell voltages.
//!
//! The crate can be used in two ways:
//!
//! - **Interpreting mode**: query both commands once, decode them into a
//!   [`TelemetryRecord`] and print it.
//! - **Bridge mode**: serve a TCP port where any number of clients send raw
//!   command bytes and get raw response frames back. The [`Multiplexer`]
//!   serializes all clients onto the single device link.
//!
//! # Example
//!
//! ```no_run
//! # #[tokio::main]
//! # pub async fn main() {
//!     let client = bmsbridge::BmsClient::new("A4:C1:38:0A:1B:2C").await.unwrap();
//!     let telemetry = client.fetch_telemetry().await.unwrap();
//!     for (name, value) in telemetry.fields() {
//!         println!("{name}: {value}");
//!     }
//! # }
//! ```

pub mod bridge;
mod client;
mod error;
mod frame;
mod link;
pub mod message;
mod telemetry;

pub use bridge::Multiplexer;
pub use client::BmsClient;
pub use error::BmsError;
pub use frame::FrameAccumulator;
pub use link::{LinkSession, LinkState, RequestSink, RESPONSE_TIMEOUT};
pub use telemetry::TelemetryRecord;
