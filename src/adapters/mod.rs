//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements   | Connects to                   |
//! |----------------|--------------|-------------------------------|
//! | `channel_sink` | EventSink    | Outbound CAN channel          |
//! | `log_sink`     | EventSink    | Serial log output             |
//! | `rs485`        | SerialPort   | UART + driver-enable GPIO     |
//! | `time`         | Clock        | ESP32 system timer / host std |

pub mod channel_sink;
pub mod log_sink;
pub mod rs485;
pub mod time;
