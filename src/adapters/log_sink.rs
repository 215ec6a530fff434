//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing every gateway event to the logger
//! (UART / USB-CDC console on the device).  Runs next to the CAN publisher
//! via the tuple fan-out impl of [`EventSink`].

use log::{info, warn};

use crate::app::events::GatewayEvent;
use crate::app::ports::EventSink;
use crate::modbus::ModbusError;

/// Adapter that logs every [`GatewayEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &GatewayEvent) {
        match *event {
            GatewayEvent::SensorValue {
                device_index,
                channel,
                value,
            } => {
                info!("VALUE | dev={} ch={} value={}", device_index, channel, value);
            }
            GatewayEvent::Diagnostic {
                function_code,
                error: ModbusError::ActorResponse,
                raw,
            } => {
                info!("ACTOR | fc={} echo=0x{:08X}", function_code, raw);
            }
            GatewayEvent::Diagnostic {
                function_code,
                error,
                raw,
            } => {
                warn!(
                    "DIAG  | fc={} error={} ({}) raw=0x{:08X}",
                    function_code,
                    error.code(),
                    error,
                    raw
                );
            }
            GatewayEvent::Online { config_version } => {
                info!("ONLINE| config v{}", config_version);
            }
        }
    }
}
