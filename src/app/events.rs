//! Outbound gateway events.
//!
//! The bus worker and the bus handler emit these through the
//! [`EventSink`](super::ports::EventSink) port.  On the device they become
//! CAN messages; in tests they are recorded.

use serde::Serialize;

use crate::modbus::ModbusError;

/// Structured events published towards the CAN side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GatewayEvent {
    /// A decoded poll value.
    SensorValue {
        device_index: u8,
        /// Always 0.
        channel: u8,
        value: u32,
    },

    /// A failed exchange or an informational reply.
    Diagnostic {
        function_code: u8,
        error: ModbusError,
        raw: u32,
    },

    /// Start-up announcement; the controller treats the gateway as offline
    /// until it sees one.
    Online { config_version: u8 },
}

impl GatewayEvent {
    pub const fn value(device_index: u8, value: u32) -> Self {
        Self::SensorValue {
            device_index,
            channel: 0,
            value,
        }
    }
}
