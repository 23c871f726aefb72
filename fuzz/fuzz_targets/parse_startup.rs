#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use vertica_protocol::FrontendMessage;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);
    if let Ok(Some(_)) = FrontendMessage::decode_initial(&mut buf) {
        while let Ok(Some(_)) = FrontendMessage::decode_tagged(&mut buf) {}
    }
});
