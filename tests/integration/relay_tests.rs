//! Integration tests for relayed write commands, CAN command to wire frame
//! to actor-response diagnostic.

use modbus_bridge::app::commands::BusCommand;
use modbus_bridge::app::service::{BusHandler, ConfigMailbox, GatewayService};
use modbus_bridge::config::{DeviceConfig, GatewayConfig, PollingCycle};
use modbus_bridge::error::{Error, RelayError};
use modbus_bridge::modbus::{FunctionCode, ModbusError, verify_crc};
use modbus_bridge::relay::{RELAY_DEPTH, RelayQueue};
use modbus_bridge::rx::RxChannel;

use super::mock_bus::{MockClock, MockSerial, RecordingSink};

const WRITE_4_REGISTERS: u8 = 0x53;
const WRITE_COIL: u8 = 0x50;
const WRITE_REGISTER_4: u8 = 0x55;

#[test]
fn multiple_register_write_goes_out_verbatim() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut port = MockSerial::echoing(writer);
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    gw.start(&mut port, &clock).unwrap();

    let handler = BusHandler::new(&relay, &mailbox);
    handler
        .handle(
            BusCommand::Write {
                opcode: WRITE_4_REGISTERS,
                data: &[0x05, 0x00, 0x01, 0xDE, 0xAD, 0xBE, 0xEF],
            },
            &mut sink,
        )
        .unwrap();

    assert_eq!(gw.run_once(&mut port, &clock, &mut sink), 1);

    let frame = &port.frames[0];
    assert_eq!(frame.len(), 13);
    assert_eq!(
        &frame[..11],
        &[0x05, 0x10, 0x01, 0x00, 0x00, 0x02, 0x04, 0xDE, 0xAD, 0xBE, 0xEF]
    );
    assert!(verify_crc(frame));

    // The echo of bytes 2..6 comes back little-endian.
    assert_eq!(
        sink.diagnostics(),
        vec![(16, ModbusError::ActorResponse, 0x0200_0001)]
    );
    assert!(relay.is_empty());
}

#[test]
fn four_byte_single_register_write_has_no_quantity_header() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut port = MockSerial::echoing(writer);
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    gw.start(&mut port, &clock).unwrap();

    let handler = BusHandler::new(&relay, &mailbox);
    handler
        .handle(
            BusCommand::Write {
                opcode: WRITE_REGISTER_4,
                data: &[0x09, 0x34, 0x12, 0x01, 0x02, 0x03, 0x04],
            },
            &mut sink,
        )
        .unwrap();

    assert_eq!(gw.run_once(&mut port, &clock, &mut sink), 1);

    let frame = &port.frames[0];
    assert_eq!(frame.len(), 10);
    assert_eq!(&frame[..8], &[0x09, 0x06, 0x12, 0x34, 0x01, 0x02, 0x03, 0x04]);
    assert!(verify_crc(frame));
    assert_eq!(
        sink.diagnostics(),
        vec![(6, ModbusError::ActorResponse, 0x0201_3412)]
    );
}

#[test]
fn due_polls_run_before_queued_writes() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut port = MockSerial::echoing(writer);
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    let mut config = GatewayConfig::default();
    config
        .devices
        .push(DeviceConfig {
            address: 1,
            function: FunctionCode::ReadHoldingRegisters,
            register: 0,
            cycle: PollingCycle::from_raw(10),
        })
        .unwrap();
    gw.apply_config(config, &mut port).unwrap();

    relay
        .submit(WRITE_COIL, &[0x07, 0x20, 0x00, 0xFF, 0x00, 0, 0])
        .unwrap();

    assert_eq!(gw.run_once(&mut port, &clock, &mut sink), 2);
    assert_eq!(port.frames[0][..2], [0x01, 0x03]);
    assert_eq!(port.frames[1][..6], [0x07, 0x05, 0x00, 0x20, 0xFF, 0x00]);

    assert_eq!(sink.values(), vec![(0, 0x0201)]);
    assert_eq!(sink.diagnostics().len(), 1);
    assert_eq!(sink.diagnostics()[0].1, ModbusError::ActorResponse);
}

#[test]
fn full_queue_rejects_and_counts_the_write() {
    let mut rx = RxChannel::new();
    let (_writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut sink = RecordingSink::new();
    let handler = BusHandler::new(&relay, &mailbox);
    let gw = GatewayService::new(reader, &relay, &mailbox);

    let write = BusCommand::Write {
        opcode: WRITE_COIL,
        data: &[0x07, 0x20, 0x00, 0xFF, 0x00, 0, 0],
    };
    for _ in 0..RELAY_DEPTH {
        handler.handle(write, &mut sink).unwrap();
    }
    assert_eq!(
        handler.handle(write, &mut sink),
        Err(Error::Relay(RelayError::QueueFull))
    );
    assert_eq!(relay.len(), RELAY_DEPTH);
    assert_eq!(gw.stats().relay_dropped, 1);
}

#[test]
fn malformed_writes_never_reach_the_queue() {
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut sink = RecordingSink::new();
    let handler = BusHandler::new(&relay, &mailbox);

    assert_eq!(
        handler.handle(
            BusCommand::Write {
                opcode: 0x42,
                data: &[0; 7]
            },
            &mut sink
        ),
        Err(Error::Relay(RelayError::UnknownOpcode(0x42)))
    );
    assert_eq!(
        handler.handle(
            BusCommand::Write {
                opcode: WRITE_4_REGISTERS,
                data: &[0x05, 0x00, 0x01, 0xDE]
            },
            &mut sink
        ),
        Err(Error::Relay(RelayError::PayloadTooShort {
            needed: 7,
            actual: 4
        }))
    );
    assert!(relay.is_empty());
    assert_eq!(relay.dropped(), 0);
}

#[test]
fn unanswered_write_is_retried_once() {
    let mut rx = RxChannel::new();
    let (writer, reader) = rx.split();
    let (relay, mailbox) = (RelayQueue::new(), ConfigMailbox::new());
    let mut port = MockSerial::silent(writer);
    let clock = MockClock::new();
    let mut sink = RecordingSink::new();

    let mut gw = GatewayService::new(reader, &relay, &mailbox);
    gw.start(&mut port, &clock).unwrap();
    relay
        .submit(WRITE_4_REGISTERS, &[0x05, 0x00, 0x01, 1, 2, 3, 4])
        .unwrap();

    gw.run_once(&mut port, &clock, &mut sink);

    assert_eq!(port.frames.len(), 2);
    assert_eq!(port.frames[0], port.frames[1]);
    assert_eq!(sink.diagnostics(), vec![(16, ModbusError::NoResponse, 0)]);
    assert_eq!(gw.stats().abandoned, 1);
}
