//! Checks that the mock server speaks the startup protocol faithfully,
//! driving it with hand-built frontend messages.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use vertica_protocol::{
    AuthenticationRequest, BackendMessage, FrontendMessage, ServerFields, Startup,
};
use vertica_testing::{MockAuth, MockVerticaServer};

async fn send(stream: &mut TcpStream, message: FrontendMessage) {
    stream.write_all(&message.to_bytes()).await.unwrap();
}

async fn recv(stream: &mut TcpStream, buf: &mut BytesMut) -> BackendMessage {
    loop {
        if let Some(message) = BackendMessage::decode(buf).unwrap() {
            return message;
        }
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read_buf(buf))
            .await
            .expect("mock server timed out")
            .unwrap();
        assert!(n > 0, "mock server closed the connection");
    }
}

fn startup(user: &str) -> FrontendMessage {
    FrontendMessage::Startup(
        Startup::new()
            .param("user", Some(user))
            .param("database", Some("vmart")),
    )
}

#[tokio::test]
async fn test_trust_session_sequence() {
    let server = MockVerticaServer::builder()
        .with_backend_pid(77)
        .build()
        .await
        .unwrap();

    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    let mut buf = BytesMut::new();
    send(&mut stream, startup("dbadmin")).await;

    assert_eq!(
        recv(&mut stream, &mut buf).await,
        BackendMessage::Authentication(AuthenticationRequest::Ok)
    );

    let mut parameters = Vec::new();
    let (pid, indicator) = loop {
        match recv(&mut stream, &mut buf).await {
            BackendMessage::ParameterStatus { name, .. } => parameters.push(name),
            BackendMessage::BackendKeyData { pid, .. } => {
                let BackendMessage::ReadyForQuery(indicator) = recv(&mut stream, &mut buf).await
                else {
                    panic!("expected ReadyForQuery after BackendKeyData");
                };
                break (pid, indicator);
            }
            other => panic!("unexpected {other:?}"),
        }
    };

    assert_eq!(pid, 77);
    assert_eq!(indicator, b'I');
    assert!(parameters.contains(&"server_version".to_string()));

    let startups = server.startups().await;
    assert_eq!(startups.len(), 1);
    assert_eq!(startups[0].get("database"), Some("vmart"));
}

#[tokio::test]
async fn test_md5_challenge_and_rejection() {
    let server = MockVerticaServer::builder()
        .with_user("dbadmin", "secret")
        .with_auth(MockAuth::Md5)
        .with_salt([1, 2, 3, 4])
        .build()
        .await
        .unwrap();

    // Correct hash.
    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    let mut buf = BytesMut::new();
    send(&mut stream, startup("dbadmin")).await;
    assert_eq!(
        recv(&mut stream, &mut buf).await,
        BackendMessage::Authentication(AuthenticationRequest::Md5Password { salt: [1, 2, 3, 4] })
    );
    send(
        &mut stream,
        FrontendMessage::Password("md5eb4ab686c356bb27c27fd00833d5a193".into()),
    )
    .await;
    assert_eq!(
        recv(&mut stream, &mut buf).await,
        BackendMessage::Authentication(AuthenticationRequest::Ok)
    );

    // Wrong hash.
    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    let mut buf = BytesMut::new();
    send(&mut stream, startup("dbadmin")).await;
    let _challenge = recv(&mut stream, &mut buf).await;
    send(&mut stream, FrontendMessage::Password("md5nope".into())).await;
    match recv(&mut stream, &mut buf).await {
        BackendMessage::ErrorResponse(fields) => {
            assert_eq!(fields.severity(), Some("FATAL"));
            assert_eq!(fields.code(), Some("28000"));
        }
        other => panic!("expected ErrorResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ssl_refused_without_tls() {
    let server = MockVerticaServer::builder().build().await.unwrap();
    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    send(&mut stream, FrontendMessage::SslRequest).await;

    let answer = stream.read_u8().await.unwrap();
    assert_eq!(answer, b'N');
}

#[tokio::test]
async fn test_startup_error_injection() {
    let server = MockVerticaServer::builder()
        .with_startup_error(ServerFields::new("FATAL", "3D000", "database \"nope\" does not exist"))
        .build()
        .await
        .unwrap();

    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    let mut buf = BytesMut::new();
    send(&mut stream, startup("dbadmin")).await;
    match recv(&mut stream, &mut buf).await {
        BackendMessage::ErrorResponse(fields) => {
            assert_eq!(fields.message(), "database \"nope\" does not exist");
        }
        other => panic!("expected ErrorResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancel_and_terminate_recorded() {
    let server = MockVerticaServer::builder().build().await.unwrap();

    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    send(&mut stream, FrontendMessage::CancelRequest { pid: 9, key: 10 }).await;
    drop(stream);

    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    let mut buf = BytesMut::new();
    send(&mut stream, startup("dbadmin")).await;
    while !matches!(recv(&mut stream, &mut buf).await, BackendMessage::ReadyForQuery(_)) {}
    send(&mut stream, FrontendMessage::Terminate).await;

    for _ in 0..100 {
        if server.terminations().await == 1 && !server.cancel_requests().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.cancel_requests().await, vec![(9, 10)]);
    assert_eq!(server.terminations().await, 1);
    assert_eq!(server.accepted_count().await, 2);
}
