//! Fuzz target: `JvConfig::from_bytes` / `from_json`
//!
//! Any input either fails to decode or yields a configuration that passes
//! validation.
//!
//! cargo fuzz run fuzz_config_decode

#![no_main]

use jvport::config::JvConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = JvConfig::from_bytes(data) {
        assert!(config.validate().is_ok());
    }
    if let Ok(text) = core::str::from_utf8(data) {
        if let Ok(config) = JvConfig::from_json(text) {
            assert!(config.validate().is_ok());
        }
    }
});
