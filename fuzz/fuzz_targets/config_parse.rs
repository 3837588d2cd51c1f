#![no_main]

use boxpub::config::{BoxpubConfig, CliOverrides};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(config) = toml::from_str::<BoxpubConfig>(text) else {
        return;
    };

    if config.validate().is_ok() {
        let options = config.build_options(&CliOverrides::default());
        assert!(!options.owner.trim().is_empty());
        assert!(!options.provider.trim().is_empty());
    }
});
