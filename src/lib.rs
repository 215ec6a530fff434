//! Modbus RTU gateway firmware library.
//!
//! Bridges a building-automation CAN bus to Modbus RTU slaves on an RS-485
//! line.  The gateway is the single bus master: it polls configured
//! registers on a schedule, relays write commands from the CAN side and
//! publishes decoded values and diagnostics back.
//!
//! All ESP-IDF-specific code is behind the `espidf` feature; everything
//! else builds and tests on the host.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod controller;
pub mod error;
pub mod modbus;
pub mod relay;
pub mod rx;
pub mod scheduler;
pub mod stats;

#[cfg(feature = "espidf")]
mod esp_link_shims;
