//! Gateway configuration.
//!
//! The configuration arrives from the CAN side as a fixed-size binary block
//! (see [`GatewayConfig::from_blob`]).  It is decoded once into typed
//! structures; nothing downstream re-parses the packed fields.
//!
//! Block layout (little-endian, [`CONFIG_BLOB_SIZE`] bytes):
//! ```text
//! ┌────────┬────────┬──────────┬──────────┬──────┬────────┬──────┬──────┬──────────┬────────────┐
//! │ version│ manual │ entries  │ baudrate │ word │ parity │ stop │ rsvd │ pause ms │ timeout ms │
//! │ u8     │ u8     │ u16      │ u32      │ u8   │ u8     │ u8   │ u8   │ u16      │ u16        │
//! └────────┴────────┴──────────┴──────────┴──────┴────────┴──────┴──────┴──────────┴────────────┘
//!   followed by MAX_DEVICES entries of
//!   [address u8][function u8][register u16][polling cycle u32]
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::modbus::frame::{
    Frame, FunctionCode, build_pdu_frame, build_request_frame,
};

/// The only block version this firmware understands.
pub const CONFIG_VERSION: u8 = 1;

/// Number of device slots in the block.
pub const MAX_DEVICES: usize = 256;

const HEADER_SIZE: usize = 16;
const DEVICE_ENTRY_SIZE: usize = 8;

/// Exact byte size of a configuration block.
pub const CONFIG_BLOB_SIZE: usize = HEADER_SIZE + MAX_DEVICES * DEVICE_ENTRY_SIZE;

// ---------------------------------------------------------------------------
// Polling cycle
// ---------------------------------------------------------------------------

const MAGNITUDE_MASK: u32 = 0x0000_0FFF;
const FLAG_SECONDS: u32 = 0x1000_0000;
const FLAG_COMBINE: u32 = 0x2000_0000;
const FLAG_HIGH_LOW: u32 = 0x4000_0000;
const FLAG_LITTLE_ENDIAN: u32 = 0x8000_0000;

/// Unit of the polling cycle magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CycleUnit {
    /// magnitude × 100 ms
    #[default]
    Deciseconds,
    /// magnitude × 1000 ms
    Seconds,
}

/// Which register of a combined pair holds the high word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegisterOrder {
    /// First register is the low word.
    #[default]
    LowHigh,
    /// First register is the high word.
    HighLow,
}

/// Byte order flag of the polled value.
///
/// Register data is read low byte first, as the configuration tool expects;
/// `Little` swaps the two bytes of every 16-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Endianness {
    #[default]
    Big,
    /// Bytes of each word swapped.
    Little,
}

/// Decoded form of the packed 32-bit polling-cycle field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PollingCycle {
    /// 0 disables polling, otherwise 1–4095.
    pub magnitude: u16,
    pub unit: CycleUnit,
    pub register_order: RegisterOrder,
    pub endianness: Endianness,
    /// Two consecutive registers form one 32-bit value.
    pub combine: bool,
}

impl PollingCycle {
    pub fn from_raw(raw: u32) -> Self {
        Self {
            magnitude: (raw & MAGNITUDE_MASK) as u16,
            unit: if raw & FLAG_SECONDS != 0 {
                CycleUnit::Seconds
            } else {
                CycleUnit::Deciseconds
            },
            register_order: if raw & FLAG_HIGH_LOW != 0 {
                RegisterOrder::HighLow
            } else {
                RegisterOrder::LowHigh
            },
            endianness: if raw & FLAG_LITTLE_ENDIAN != 0 {
                Endianness::Little
            } else {
                Endianness::Big
            },
            combine: raw & FLAG_COMBINE != 0,
        }
    }

    pub fn to_raw(self) -> u32 {
        let mut raw = u32::from(self.magnitude) & MAGNITUDE_MASK;
        if self.unit == CycleUnit::Seconds {
            raw |= FLAG_SECONDS;
        }
        if self.combine {
            raw |= FLAG_COMBINE;
        }
        if self.register_order == RegisterOrder::HighLow {
            raw |= FLAG_HIGH_LOW;
        }
        if self.endianness == Endianness::Little {
            raw |= FLAG_LITTLE_ENDIAN;
        }
        raw
    }

    pub fn is_enabled(self) -> bool {
        self.magnitude != 0
    }

    /// Poll period in milliseconds, `None` when polling is disabled.
    pub fn period_ms(self) -> Option<u32> {
        if !self.is_enabled() {
            return None;
        }
        let unit_ms = match self.unit {
            CycleUnit::Deciseconds => 100,
            CycleUnit::Seconds => 1000,
        };
        Some(u32::from(self.magnitude) * unit_ms)
    }
}

// ---------------------------------------------------------------------------
// Device entries
// ---------------------------------------------------------------------------

/// One polled Modbus slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub address: u8,
    pub function: FunctionCode,
    pub register: u16,
    pub cycle: PollingCycle,
}

impl DeviceConfig {
    /// Registers (or coils) requested per poll.
    pub fn word_count(&self) -> u16 {
        match self.function {
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters
                if self.cycle.combine =>
            {
                2
            }
            _ => 1,
        }
    }

    /// The read request issued for this device on every poll.
    pub fn poll_frame(&self) -> Frame {
        match self.function {
            FunctionCode::ReadExceptionStatus => build_pdu_frame(self.address, self.function, &[]),
            _ => build_request_frame(self.address, self.function, self.register, self.word_count()),
        }
    }

    fn decode(index: usize, entry: &[u8]) -> Result<Self, ConfigError> {
        let function = FunctionCode::try_from(entry[1])
            .ok()
            .filter(|fc| fc.is_pollable())
            .ok_or(ConfigError::UnsupportedFunctionCode {
                index: index as u16,
                code: entry[1],
            })?;
        Ok(Self {
            address: entry[0],
            function,
            register: u16::from_le_bytes([entry[2], entry[3]]),
            cycle: PollingCycle::from_raw(u32::from_le_bytes([
                entry[4], entry[5], entry[6], entry[7],
            ])),
        })
    }

    fn encode(&self, entry: &mut [u8]) {
        entry[0] = self.address;
        entry[1] = self.function.code();
        entry[2..4].copy_from_slice(&self.register.to_le_bytes());
        entry[4..8].copy_from_slice(&self.cycle.to_raw().to_le_bytes());
    }
}

// ---------------------------------------------------------------------------
// Serial line
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WordLength {
    Eight,
    Nine,
}

impl WordLength {
    pub const fn bits(self) -> u32 {
        match self {
            Self::Eight => 8,
            Self::Nine => 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    Two,
}

impl StopBits {
    pub const fn bits(self) -> u32 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

/// Parity codes 0–4 as emitted by the configuration tool.
///
/// `Space` and `Mark` are shown as "0" and "1" in the tool's summary; the
/// UART backend has no forced-parity mode (see `adapters::rs485`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
    Space,
    Mark,
}

impl Parity {
    fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Even),
            2 => Some(Self::Odd),
            3 => Some(Self::Space),
            4 => Some(Self::Mark),
            _ => None,
        }
    }

    const fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Even => 1,
            Self::Odd => 2,
            Self::Space => 3,
            Self::Mark => 4,
        }
    }

    const fn symbol(self) -> char {
        match self {
            Self::None => 'N',
            Self::Even => 'E',
            Self::Odd => 'O',
            Self::Space => '0',
            Self::Mark => '1',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub word_length: WordLength,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            word_length: WordLength::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl SerialConfig {
    /// Bits per character on the wire: start, 8 data bits, the parity bit
    /// when enabled, stop bits.  A 9-bit word is 8 data bits plus parity, so
    /// the word length adds nothing beyond the parity bit.
    pub fn character_bits(&self) -> u32 {
        let parity = u32::from(self.parity != Parity::None);
        1 + 8 + parity + self.stop_bits.bits()
    }
}

/// `9600 8N1` style summary.
impl fmt::Display for SerialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate,
            self.word_length.bits(),
            self.parity.symbol(),
            self.stop_bits.bits()
        )
    }
}

/// How the bus turnaround pause and response timeout are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimingMode {
    /// Derived from the serial line settings.
    #[default]
    Automatic,
    /// Explicit values from the configuration tool.
    Manual { pause_ms: u16, timeout_ms: u16 },
}

// ---------------------------------------------------------------------------
// Gateway configuration block
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub serial: SerialConfig,
    pub timing: TimingMode,
    pub devices: heapless::Vec<DeviceConfig, MAX_DEVICES>,
}

impl Default for GatewayConfig {
    /// Power-on configuration: 9600 8N1, automatic timing, nothing to poll.
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            timing: TimingMode::Automatic,
            devices: heapless::Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Decode and validate a configuration block.
    ///
    /// The block must be exactly [`CONFIG_BLOB_SIZE`] bytes and carry
    /// [`CONFIG_VERSION`].  Any error leaves the caller's current config
    /// untouched.
    pub fn from_blob(blob: &[u8]) -> Result<Self, ConfigError> {
        if blob.len() != CONFIG_BLOB_SIZE {
            return Err(ConfigError::WrongSize {
                expected: CONFIG_BLOB_SIZE,
                actual: blob.len(),
            });
        }
        let (header, entries) = blob.split_at(HEADER_SIZE);

        if header[0] != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(header[0]));
        }
        let manual = header[1] != 0;
        let entry_count = u16::from_le_bytes([header[2], header[3]]);
        if usize::from(entry_count) > MAX_DEVICES {
            return Err(ConfigError::TooManyEntries(entry_count));
        }
        let baud_rate = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if baud_rate == 0 {
            return Err(ConfigError::InvalidBaudRate);
        }
        let word_length = match header[8] {
            8 => WordLength::Eight,
            9 => WordLength::Nine,
            other => return Err(ConfigError::InvalidWordLength(other)),
        };
        let parity = Parity::from_code(header[9]).ok_or(ConfigError::InvalidParity(header[9]))?;
        let stop_bits = match header[10] {
            0 => StopBits::One,
            1 => StopBits::Two,
            other => return Err(ConfigError::InvalidStopBits(other)),
        };
        let timing = if manual {
            TimingMode::Manual {
                pause_ms: u16::from_le_bytes([header[12], header[13]]),
                timeout_ms: u16::from_le_bytes([header[14], header[15]]),
            }
        } else {
            TimingMode::Automatic
        };

        let mut devices = heapless::Vec::new();
        for (index, entry) in entries
            .chunks_exact(DEVICE_ENTRY_SIZE)
            .take(usize::from(entry_count))
            .enumerate()
        {
            let device = DeviceConfig::decode(index, entry)?;
            // entry_count <= MAX_DEVICES was checked above.
            let _ = devices.push(device);
        }

        Ok(Self {
            serial: SerialConfig {
                baud_rate,
                word_length,
                parity,
                stop_bits,
            },
            timing,
            devices,
        })
    }

    /// Encode into the block layout [`from_blob`](Self::from_blob) reads.
    /// Unused device slots are zero.
    pub fn to_blob(&self) -> [u8; CONFIG_BLOB_SIZE] {
        let mut blob = [0u8; CONFIG_BLOB_SIZE];
        blob[0] = CONFIG_VERSION;
        blob[2..4].copy_from_slice(&(self.devices.len() as u16).to_le_bytes());
        blob[4..8].copy_from_slice(&self.serial.baud_rate.to_le_bytes());
        blob[8] = self.serial.word_length.bits() as u8;
        blob[9] = self.serial.parity.code();
        blob[10] = u8::from(self.serial.stop_bits == StopBits::Two);
        if let TimingMode::Manual {
            pause_ms,
            timeout_ms,
        } = self.timing
        {
            blob[1] = 1;
            blob[12..14].copy_from_slice(&pause_ms.to_le_bytes());
            blob[14..16].copy_from_slice(&timeout_ms.to_le_bytes());
        }
        for (device, entry) in self
            .devices
            .iter()
            .zip(blob[HEADER_SIZE..].chunks_exact_mut(DEVICE_ENTRY_SIZE))
        {
            device.encode(entry);
        }
        blob
    }

    /// Devices that will actually be polled.
    pub fn enabled_devices(&self) -> usize {
        self.devices.iter().filter(|d| d.cycle.is_enabled()).count()
    }
}

// ---------------------------------------------------------------------------
// Bus timing
// ---------------------------------------------------------------------------

/// Lower clamp for both timing values.
pub const MIN_TIMING_MS: u32 = 5;
/// Upper clamp for both timing values.
pub const MAX_TIMING_MS: u32 = 10_000;
/// Response timeout used in automatic mode.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u32 = 1000;

/// Effective half-duplex timing derived from a [`GatewayConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusTiming {
    /// Idle time after every exchange before the line may be reused.
    pub inter_frame_pause_ms: u32,
    /// Longest wait for the first reply byte.
    pub response_timeout_ms: u32,
}

impl BusTiming {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let (pause, timeout) = match config.timing {
            TimingMode::Manual {
                pause_ms,
                timeout_ms,
            } => (u32::from(pause_ms), u32::from(timeout_ms)),
            TimingMode::Automatic => (
                turnaround_ms(&config.serial),
                DEFAULT_RESPONSE_TIMEOUT_MS,
            ),
        };
        Self {
            inter_frame_pause_ms: pause.clamp(MIN_TIMING_MS, MAX_TIMING_MS),
            response_timeout_ms: timeout.clamp(MIN_TIMING_MS, MAX_TIMING_MS),
        }
    }
}

impl Default for BusTiming {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

/// 3.5 character times, rounded up to whole milliseconds.
fn turnaround_ms(serial: &SerialConfig) -> u32 {
    let numerator = u64::from(serial.character_bits()) * 1000 * 35;
    let denominator = u64::from(serial.baud_rate.max(1)) * 10;
    numerator.div_ceil(denominator).min(u64::from(u32::MAX)) as u32
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a configuration block is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    WrongSize { expected: usize, actual: usize },
    UnsupportedVersion(u8),
    TooManyEntries(u16),
    InvalidBaudRate,
    InvalidWordLength(u8),
    InvalidParity(u8),
    InvalidStopBits(u8),
    UnsupportedFunctionCode { index: u16, code: u8 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongSize { expected, actual } => {
                write!(f, "block is {actual} bytes, expected {expected}")
            }
            Self::UnsupportedVersion(v) => write!(f, "unsupported version {v}"),
            Self::TooManyEntries(n) => write!(f, "{n} entries exceed {MAX_DEVICES}"),
            Self::InvalidBaudRate => write!(f, "baud rate is zero"),
            Self::InvalidWordLength(w) => write!(f, "word length {w} (8 or 9)"),
            Self::InvalidParity(p) => write!(f, "parity code {p}"),
            Self::InvalidStopBits(s) => write!(f, "stop bits code {s}"),
            Self::UnsupportedFunctionCode { index, code } => {
                write!(f, "device #{index}: function code {code} cannot be polled")
            }
        }
    }
}
