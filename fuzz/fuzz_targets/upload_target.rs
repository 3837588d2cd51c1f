#![no_main]

use boxpub_registry::parse_upload_target;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };

    match parse_upload_target(body) {
        Ok(target) => {
            assert!(!target.as_str().is_empty());
            // The accepted body must actually carry that string.
            let value: serde_json::Value = serde_json::from_str(body).expect("accepted body is JSON");
            assert_eq!(value["upload_path"].as_str().map(str::trim), Some(target.as_str()));
        }
        Err(err) => assert!(err.is_data_shape()),
    }
});
