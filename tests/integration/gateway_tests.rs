//! Integration tests for the poll path: scheduler → cycle controller →
//! classifier → event sink, against the mock bus.

use modbus_bridge::app::commands::BusCommand;
use modbus_bridge::app::events::GatewayEvent;
use modbus_bridge::app::ports::Clock;
use modbus_bridge::app::service::{BusHandler, ConfigMailbox, GatewayService};
use modbus_bridge::config::{
    ConfigError, DeviceConfig, GatewayConfig, PollingCycle, SerialConfig, TimingMode,
};
use modbus_bridge::error::Error;
use modbus_bridge::modbus::{FunctionCode, ModbusError};
use modbus_bridge::relay::RelayQueue;
use modbus_bridge::rx::RxChannel;

use super::mock_bus::{MockClock, MockSerial, RecordingSink, good_reply, with_crc};

fn device(address: u8, function: FunctionCode, raw_cycle: u32) -> DeviceConfig {
    DeviceConfig {
        address,
        function,
        register: 0x0010,
        cycle: PollingCycle::from_raw(raw_cycle),
    }
}

fn config_with(devices: &[DeviceConfig]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    for d in devices {
        config.devices.push(*d).unwrap();
    }
    config
}

// ── Scheduling ────────────────────────────────────────────────

#[test]
fn one_second_cycle_is_measured_from_poll_time() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut port = MockSerial::echoing(writer);
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    gw.apply_config(
        config_with(&[device(1, FunctionCode::ReadHoldingRegisters, 10)]),
        &mut port,
    )
    .unwrap();

    let mut poll_times = Vec::new();
    while clock.now_ms() < 3000 {
        let start = clock.now_ms();
        if gw.run_once(&mut port, &clock, &mut sink) > 0 {
            poll_times.push(start);
            assert_eq!(gw.scheduler().next_due_ms(0), Some(start + 1000));
        }
    }

    assert_eq!(poll_times.len(), 3, "polls at {poll_times:?}");
    assert_eq!(poll_times[0], 0);
    for pair in poll_times.windows(2) {
        let gap = pair[1] - pair[0];
        assert!((1000..1020).contains(&gap), "gap {gap} ms");
    }
    assert_eq!(sink.values(), vec![(0, 0x0201); 3]);
}

#[test]
fn disabled_devices_are_skipped() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut port = MockSerial::echoing(writer);
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    gw.apply_config(
        config_with(&[
            device(1, FunctionCode::ReadCoils, 0),
            device(2, FunctionCode::ReadCoils, 5),
        ]),
        &mut port,
    )
    .unwrap();

    assert_eq!(gw.run_once(&mut port, &clock, &mut sink), 1);
    assert_eq!(port.frames.len(), 1);
    assert_eq!(port.frames[0][0], 2);
    assert_eq!(sink.values(), vec![(1, 1)]);
}

// ── Decoding through the whole pipeline ──────────────────────

#[test]
fn combined_high_low_little_endian_value() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut port = MockSerial::echoing(writer);
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    // combine | high-low | little-endian, 1 s
    let raw = 0x2000_0000 | 0x4000_0000 | 0x8000_0000 | 10;
    gw.apply_config(
        config_with(&[device(5, FunctionCode::ReadInputRegisters, raw)]),
        &mut port,
    )
    .unwrap();

    gw.run_once(&mut port, &clock, &mut sink);
    assert_eq!(&port.frames[0][..6], &[5, 4, 0x00, 0x10, 0x00, 0x02]);
    assert_eq!(sink.values(), vec![(0, 0x0102_0304)]);
}

#[test]
fn exception_status_poll() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut port = MockSerial::echoing(writer);
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    gw.apply_config(
        config_with(&[device(9, FunctionCode::ReadExceptionStatus, 10)]),
        &mut port,
    )
    .unwrap();

    gw.run_once(&mut port, &clock, &mut sink);
    assert_eq!(port.frames[0].len(), 4);
    assert_eq!(sink.values(), vec![(0, 0x42)]);
}

// ── Retry policy ──────────────────────────────────────────────

#[test]
fn two_timeouts_mean_one_retry_and_one_diagnostic() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut port = MockSerial::silent(writer);
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    gw.apply_config(
        config_with(&[device(1, FunctionCode::ReadHoldingRegisters, 10)]),
        &mut port,
    )
    .unwrap();

    gw.run_once(&mut port, &clock, &mut sink);

    assert_eq!(port.frames.len(), 2);
    assert_eq!(port.frames[0], port.frames[1]);
    assert_eq!(
        sink.diagnostics(),
        vec![(3, ModbusError::NoResponse, 0)]
    );
    assert!(sink.values().is_empty());

    // 2 × (10 × 100 ms wait + 5 ms pause) + 10 ms idle
    let sleeps = clock.sleeps.borrow();
    assert_eq!(sleeps.iter().filter(|&&ms| ms == 100).count(), 20);
    assert_eq!(clock.now_ms(), 2 * (1000 + 5) + 10);

    let stats = gw.stats();
    assert_eq!(stats.attempts, 2);
    assert_eq!(stats.retries, 1);
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.errors_of(ModbusError::NoResponse), 2);
}

#[test]
fn retry_recovers_from_a_corrupted_reply() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut calls = 0;
    let mut port = MockSerial::new(
        writer,
        move |frame| {
            calls += 1;
            let mut reply = good_reply(frame);
            if calls == 1 {
                let last = reply.len() - 1;
                reply[last] ^= 0xFF;
            }
            Some(reply)
        },
    );
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    gw.apply_config(
        config_with(&[device(1, FunctionCode::ReadCoils, 10)]),
        &mut port,
    )
    .unwrap();

    gw.run_once(&mut port, &clock, &mut sink);

    assert_eq!(port.frames.len(), 2);
    assert_eq!(sink.values(), vec![(0, 1)]);
    assert!(sink.diagnostics().is_empty());
    assert_eq!(gw.stats().errors_of(ModbusError::CrcError), 1);
    assert_eq!(gw.stats().abandoned, 0);
}

#[test]
fn decoded_diagnostic_is_not_retried() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    // Two data bytes where one is expected.
    let mut port = MockSerial::new(
        writer,
        |frame| Some(with_crc(&[frame[0], frame[1], 2, 0xAA, 0xBB])),
    );
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    gw.apply_config(
        config_with(&[device(1, FunctionCode::ReadDiscreteInputs, 10)]),
        &mut port,
    )
    .unwrap();

    gw.run_once(&mut port, &clock, &mut sink);

    assert_eq!(port.frames.len(), 1);
    assert_eq!(
        sink.diagnostics(),
        vec![(2, ModbusError::InvalidReceiveLength, 0xBBAA)]
    );
}

#[test]
fn reply_from_wrong_slave_is_invalid_response() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut port = MockSerial::new(
        writer,
        |frame| {
            let mut other = frame.to_vec();
            other[0] = frame[0].wrapping_add(1);
            Some(good_reply(&other))
        },
    );
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    gw.apply_config(
        config_with(&[device(1, FunctionCode::ReadHoldingRegisters, 10)]),
        &mut port,
    )
    .unwrap();

    gw.run_once(&mut port, &clock, &mut sink);

    assert_eq!(port.frames.len(), 2);
    assert_eq!(
        sink.diagnostics(),
        vec![(3, ModbusError::InvalidResponse, 0)]
    );
}

// ── Configuration hand-off ────────────────────────────────────

#[test]
fn config_reload_resets_every_deadline() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut port = MockSerial::echoing(writer);
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    gw.start(&mut port, &clock).unwrap();
    // 10 s cycle
    gw.apply_config(
        config_with(&[device(1, FunctionCode::ReadHoldingRegisters, 0x1000_000A)]),
        &mut port,
    )
    .unwrap();
    assert_eq!(gw.run_once(&mut port, &clock, &mut sink), 1);
    assert_eq!(gw.run_once(&mut port, &clock, &mut sink), 0);

    let mut next = config_with(&[
        device(2, FunctionCode::ReadInputRegisters, 0x1000_000A),
        device(3, FunctionCode::ReadCoils, 0x1000_000A),
    ]);
    next.serial = SerialConfig {
        baud_rate: 19_200,
        ..SerialConfig::default()
    };
    next.timing = TimingMode::Manual {
        pause_ms: 20,
        timeout_ms: 300,
    };
    let blob = next.to_blob();

    let handler = BusHandler::new(&relay, &mailbox);
    handler
        .handle(BusCommand::LoadConfig(&blob), &mut sink)
        .unwrap();

    let reload_at = clock.now_ms();
    assert_eq!(gw.run_once(&mut port, &clock, &mut sink), 2);

    assert_eq!(gw.config(), &next);
    assert_eq!(port.configured.last().map(|c| c.baud_rate), Some(19_200));
    assert_eq!(gw.timing().inter_frame_pause_ms, 20);
    assert_eq!(gw.timing().response_timeout_ms, 300);
    assert_eq!(gw.scheduler().next_due_ms(0), Some(reload_at + 10_000));
    let addresses: Vec<u8> = port.frames[1..].iter().map(|f| f[0]).collect();
    assert_eq!(addresses, [2, 3]);
}

#[test]
fn rejected_config_keeps_the_current_one() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut port = MockSerial::echoing(writer);
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    let current = config_with(&[device(1, FunctionCode::ReadCoils, 10)]);
    gw.apply_config(current.clone(), &mut port).unwrap();

    let handler = BusHandler::new(&relay, &mailbox);
    let mut blob = config_with(&[]).to_blob();
    blob[0] = 2;
    assert_eq!(
        handler.handle(BusCommand::LoadConfig(&blob), &mut sink),
        Err(Error::Config(ConfigError::UnsupportedVersion(2)))
    );
    assert_eq!(
        handler.handle(BusCommand::LoadConfig(&blob[..100]), &mut sink),
        Err(Error::Config(ConfigError::WrongSize {
            expected: blob.len(),
            actual: 100
        }))
    );

    gw.run_once(&mut port, &clock, &mut sink);
    assert_eq!(gw.config(), &current);
    assert_eq!(port.configured.len(), 1);
}

#[test]
fn start_request_announces_config_version_one() {
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut sink = RecordingSink::new();
    let handler = BusHandler::new(&relay, &mailbox);

    handler.handle(BusCommand::StartRequest, &mut sink).unwrap();
    assert_eq!(sink.events, vec![GatewayEvent::Online { config_version: 1 }]);
}
