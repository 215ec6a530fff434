//! Application core: protocol orchestration, zero direct I/O.
//!
//! The bus worker ([`service::GatewayService`]) and the CAN-side entry point
//! ([`service::BusHandler`]) live here.  All interaction with hardware
//! happens through the **port traits** in [`ports`], so the whole gateway
//! runs against mock adapters on the host.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
