//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below exercises one path through the gateway against the
//! mock bus.  All tests run on the host with no hardware required.

mod gateway_tests;
mod mock_bus;
mod relay_tests;
