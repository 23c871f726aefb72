//! Framing must not depend on how the byte stream is chunked.

#![allow(clippy::unwrap_used)]

use bytes::BytesMut;
use proptest::prelude::*;
use vertica_protocol::{AuthenticationRequest, BackendMessage, ServerFields};

fn startup_reply() -> Vec<BackendMessage> {
    vec![
        BackendMessage::Authentication(AuthenticationRequest::Md5Password { salt: [9, 8, 7, 6] }),
        BackendMessage::Authentication(AuthenticationRequest::Ok),
        BackendMessage::ParameterStatus {
            name: "server_version".into(),
            value: "v12.0.4-0".into(),
        },
        BackendMessage::NoticeResponse(ServerFields::new("NOTICE", "00000", "hello")),
        BackendMessage::BackendKeyData { pid: 31337, key: -5 },
        BackendMessage::ReadyForQuery(b'I'),
    ]
}

proptest! {
    #[test]
    fn decode_is_chunking_independent(cuts in proptest::collection::vec(1usize..16, 1..64)) {
        let expected = startup_reply();
        let mut wire = BytesMut::new();
        for msg in &expected {
            msg.encode(&mut wire);
        }
        let wire = wire.freeze();

        let mut inbound = BytesMut::new();
        let mut decoded = Vec::new();
        let mut offset = 0;
        let mut cuts = cuts.into_iter().cycle();
        while offset < wire.len() {
            let step = cuts.next().unwrap_or(1).min(wire.len() - offset);
            inbound.extend_from_slice(&wire[offset..offset + step]);
            offset += step;
            while let Some(msg) = BackendMessage::decode(&mut inbound).unwrap() {
                decoded.push(msg);
            }
        }

        prop_assert!(inbound.is_empty());
        prop_assert_eq!(decoded, expected);
    }

    #[test]
    fn garbage_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut inbound = BytesMut::from(&bytes[..]);
        while let Ok(Some(_)) = BackendMessage::decode(&mut inbound) {}
    }
}
