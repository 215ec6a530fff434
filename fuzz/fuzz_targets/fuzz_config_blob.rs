//! Fuzz target: `GatewayConfig::from_blob`
//!
//! Any block that decodes must re-encode to a block that decodes to the
//! same configuration.
//!
//! cargo fuzz run fuzz_config_blob

#![no_main]

use libfuzzer_sys::fuzz_target;
use modbus_bridge::config::{CONFIG_BLOB_SIZE, GatewayConfig};

fuzz_target!(|data: &[u8]| {
    let mut blob = [0u8; CONFIG_BLOB_SIZE];
    let n = data.len().min(CONFIG_BLOB_SIZE);
    blob[..n].copy_from_slice(&data[..n]);
    // Most inputs would stop at the version check otherwise.
    blob[0] = 1;

    let _ = GatewayConfig::from_blob(data);
    if let Ok(config) = GatewayConfig::from_blob(&blob) {
        assert!(config.devices.len() <= 256);
        assert_eq!(GatewayConfig::from_blob(&config.to_blob()), Ok(config));
    }
});
