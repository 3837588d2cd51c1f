#![no_main]

use std::fs;

use boxpub::auth::load_credential;
use libfuzzer_sys::fuzz_target;
use tempfile::tempdir;

fuzz_target!(|data: &[u8]| {
    let td = match tempdir() {
        Ok(v) => v,
        Err(_) => return,
    };

    let token = td.path().join(".token");
    if fs::write(&token, data).is_err() {
        return;
    }

    if let Ok(credential) = load_credential(&token) {
        let secret = credential.expose();
        assert!(!secret.is_empty());
        assert_eq!(secret, secret.trim());
    }
});
