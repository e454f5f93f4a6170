#![no_main]

use libfuzzer_sys::fuzz_target;
use opstat::config::ProjectConfig;

fuzz_target!(|data: &[u8]| {
    // Parsing and validating arbitrary TOML must never panic
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(config) = ProjectConfig::from_toml_str(input) {
            let _ = config.validate();
            let _ = config.normalized_slug();
        }
    }
});
