#![no_main]

use libfuzzer_sys::fuzz_target;
use vertica_client::Config;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = Config::from_conninfo(s) {
            let _ = config.port_number();
            let _ = config.effective_dbname();
        }
    }
});
