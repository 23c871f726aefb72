#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use vertica_protocol::BackendMessage;

fuzz_target!(|data: &[u8]| {
    // Decode every whole frame in the buffer; stop at the first error.
    let mut buf = BytesMut::from(data);
    while let Ok(Some(message)) = BackendMessage::decode(&mut buf) {
        let _ = message.name();
    }
});
