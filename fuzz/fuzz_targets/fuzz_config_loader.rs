#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsing and validation may reject anything, but must never panic.
    let Ok(cfg) = sorter_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        // A validated config always resolves every label to a bin.
        let positions = cfg.bin_positions().unwrap_or_default();
        assert!(cfg.classifier.labels.iter().all(|l| positions.contains_key(l)));
    }
});
