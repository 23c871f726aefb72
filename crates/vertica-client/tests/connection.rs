//! Blocking establishment, reset, introspection and teardown against the
//! mock server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use vertica_client::{
    Connection, ConnectionStatus, Error, HandlePhase, LoginFields, LoginParams, TransactionStatus,
    Value,
};
use vertica_protocol::{AuthenticationRequest, ServerFields};
use vertica_testing::{MockAuth, MockVerticaServer};

fn failed_handle(err: Error) -> Connection {
    err.into_connection_error()
        .expect("expected a connection error")
        .into_connection()
        .expect("establishment failure owns the handle")
}

#[test]
fn test_blocking_connect_reports_session() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder().with_backend_pid(100));

    let conn = Connection::new(&format!("{} user=dbadmin dbname=vmart", server.conninfo())).unwrap();

    assert_eq!(conn.phase(), HandlePhase::Bound);
    assert_eq!(conn.status().unwrap(), ConnectionStatus::Ok);
    assert_eq!(conn.transaction_status().unwrap(), TransactionStatus::Idle);
    assert_eq!(conn.host().unwrap(), "127.0.0.1");
    assert_eq!(conn.port().unwrap(), server.port().to_string());
    assert_eq!(conn.user().unwrap(), "dbadmin");
    assert_eq!(conn.db().unwrap(), "vmart");
    assert_eq!(conn.password().unwrap(), "");
    assert_eq!(conn.options().unwrap(), "");
    assert_eq!(conn.protocol_version().unwrap(), 3);
    assert_eq!(conn.server_version().unwrap(), 120_004);
    assert_eq!(conn.backend_pid().unwrap(), 100);
    assert_eq!(conn.error_message().unwrap(), "");
    assert!(!conn.uses_encryption().unwrap());
    assert!(conn.socket().unwrap().is_some());
    assert_eq!(conn.parameter_status("client_encoding").unwrap(), Some("UTF8"));
}

#[test]
fn test_startup_packet_contents() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder());

    let _conn = Connection::new(&format!(
        "{} user=dbadmin client_label=loader options='-c search_path=public'",
        server.conninfo()
    ))
    .unwrap();

    let startups = rt.block_on(server.startups());
    assert_eq!(startups.len(), 1);
    let startup = &startups[0];
    assert_eq!(startup.get("user"), Some("dbadmin"));
    // Database defaults to the user name.
    assert_eq!(startup.get("database"), Some("dbadmin"));
    assert_eq!(startup.get("options"), Some("-c search_path=public"));
    assert_eq!(startup.get("client_label"), Some("loader"));
}

#[test]
fn test_parameter_status_miss_is_none() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder());
    let conn = Connection::new(&server.conninfo()).unwrap();

    assert_eq!(conn.parameter_status("nonexistent_key").unwrap(), None);
    assert!(conn.parameters().unwrap().contains_key("server_version"));
}

#[test]
fn test_status_is_stable_between_calls() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder());
    let conn = Connection::new(&server.conninfo()).unwrap();

    assert_eq!(conn.status().unwrap(), conn.status().unwrap());
    assert_eq!(conn.backend_pid().unwrap(), conn.backend_pid().unwrap());
    assert_eq!(conn.socket().unwrap(), conn.socket().unwrap());
}

#[test]
fn test_transaction_indicator() {
    let rt = common::runtime();
    let server = common::start(
        &rt,
        MockVerticaServer::builder().with_transaction_indicator(b'T'),
    );
    let conn = Connection::new(&server.conninfo()).unwrap();
    assert_eq!(
        conn.transaction_status().unwrap(),
        TransactionStatus::InTransaction
    );
}

#[test]
fn test_cleartext_and_md5_authentication() {
    let rt = common::runtime();
    for auth in [MockAuth::Cleartext, MockAuth::Md5] {
        let server = common::start(
            &rt,
            MockVerticaServer::builder()
                .with_user("dbadmin", "secret")
                .with_auth(auth.clone()),
        );
        let conn = Connection::new(&format!(
            "{} user=dbadmin password=secret",
            server.conninfo()
        ))
        .unwrap();
        assert_eq!(conn.status().unwrap(), ConnectionStatus::Ok, "{auth:?}");
        assert_eq!(conn.password().unwrap(), "secret");
    }
}

#[test]
fn test_wrong_password_raises_connection_error() {
    let rt = common::runtime();
    let server = common::start(
        &rt,
        MockVerticaServer::builder()
            .with_user("dbadmin", "secret")
            .with_auth(MockAuth::Md5),
    );

    let err = Connection::new(&format!("{} user=dbadmin password=wrong", server.conninfo()))
        .unwrap_err();
    assert!(err.is_connection_error());
    assert!(!err.is_misuse());
    assert!(err.to_string().starts_with("FATAL:  Invalid username or password"));

    let conn = failed_handle(err);
    assert_eq!(conn.phase(), HandlePhase::Failed);
    assert_eq!(conn.status().unwrap(), ConnectionStatus::Bad);
    assert_eq!(conn.transaction_status().unwrap(), TransactionStatus::Unknown);
    assert_eq!(conn.protocol_version().unwrap(), 0);
    assert_eq!(conn.socket().unwrap(), None);
    assert_eq!(conn.host().unwrap(), "127.0.0.1");
}

#[test]
fn test_missing_password() {
    let rt = common::runtime();
    let server = common::start(
        &rt,
        MockVerticaServer::builder()
            .with_user("dbadmin", "secret")
            .with_auth(MockAuth::Cleartext),
    );

    let err = Connection::new(&format!("{} user=dbadmin", server.conninfo())).unwrap_err();
    assert_eq!(err.to_string(), "fe_sendauth: no password supplied");
}

#[test]
fn test_unsupported_authentication_method() {
    let rt = common::runtime();
    let server = common::start(
        &rt,
        MockVerticaServer::builder().with_auth(MockAuth::Request(AuthenticationRequest::KerberosV5)),
    );

    let err = Connection::new(&server.conninfo()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "authentication method \"kerberos v5\" is not supported"
    );
}

#[test]
fn test_startup_error_is_reported() {
    let rt = common::runtime();
    let server = common::start(
        &rt,
        MockVerticaServer::builder().with_startup_error(
            ServerFields::new("FATAL", "3D000", "Database \"nope\" does not exist")
                .with(b'H', "Check the database name"),
        ),
    );

    let err = Connection::new(&format!("{} dbname=nope", server.conninfo())).unwrap_err();
    assert_eq!(
        err.to_string(),
        "FATAL:  Database \"nope\" does not exist\nHINT:  Check the database name"
    );
    let conn = failed_handle(err);
    assert_eq!(conn.error_message().unwrap(), conn.error_message().unwrap());
    assert_eq!(conn.db().unwrap(), "nope");
}

#[test]
fn test_refused_port() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = Connection::new(&format!("host=127.0.0.1 port={port}")).unwrap_err();
    let conn = failed_handle(err);
    assert_eq!(conn.status().unwrap(), ConnectionStatus::Bad);
    assert!(conn.error_message().unwrap().starts_with("could not connect to server"));
}

#[test]
fn test_malformed_conninfo_is_a_connection_error() {
    let err = Connection::new("host='unterminated").unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(
        err.to_string(),
        "unterminated quoted string in connection info string"
    );
}

#[test]
fn test_localhost_falls_back_across_addresses() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder());

    let conn = Connection::new(&format!("host=localhost port={}", server.port())).unwrap();
    assert_eq!(conn.status().unwrap(), ConnectionStatus::Ok);
    assert_eq!(conn.host().unwrap(), "localhost");
}

#[test]
fn test_hostaddr_overrides_resolution() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder());

    let conn = Connection::new(&format!(
        "host=db.example.invalid hostaddr=127.0.0.1 port={}",
        server.port()
    ))
    .unwrap();
    assert_eq!(conn.host().unwrap(), "db.example.invalid");
}

#[test]
fn test_notices_are_retained() {
    let rt = common::runtime();
    let server = common::start(
        &rt,
        MockVerticaServer::builder().with_notice(ServerFields::new(
            "NOTICE",
            "00000",
            "license expires soon",
        )),
    );

    let conn = Connection::new(&server.conninfo()).unwrap();
    let notices = conn.notices().unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].message(), "license expires soon");
}

#[test]
fn test_finish_is_idempotent_and_terminates() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder());
    let mut conn = Connection::new(&server.conninfo()).unwrap();

    conn.finish();
    conn.finish();
    conn.close();
    assert_eq!(conn.phase(), HandlePhase::Terminated);

    assert!(conn.status().unwrap_err().is_not_connected());
    assert!(conn.host().unwrap_err().is_not_connected());
    assert!(conn.parameter_status("server_version").unwrap_err().is_not_connected());
    assert!(conn.reset().unwrap_err().is_not_connected());
    assert!(conn.poll().unwrap_err().is_not_connected());
    assert_eq!(Error::NotConnected.to_string(), "not connected");

    let terminations = common::eventually(&rt, || server.terminations(), |n| *n == 1);
    assert_eq!(terminations, 1);
}

#[test]
fn test_drop_releases_connection() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder());
    {
        let _conn = Connection::new(&server.conninfo()).unwrap();
    }
    let terminations = common::eventually(&rt, || server.terminations(), |n| *n == 1);
    assert_eq!(terminations, 1);
}

#[test]
fn test_reset_preserves_identity() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder());
    let mut conn =
        Connection::new(&format!("{} user=dbadmin dbname=vmart", server.conninfo())).unwrap();

    let before = conn.backend_pid().unwrap();
    conn.reset().unwrap();

    assert_eq!(conn.phase(), HandlePhase::Bound);
    assert_eq!(conn.status().unwrap(), ConnectionStatus::Ok);
    assert_eq!(conn.host().unwrap(), "127.0.0.1");
    assert_eq!(conn.user().unwrap(), "dbadmin");
    assert_eq!(conn.db().unwrap(), "vmart");
    assert_eq!(before, server.backend_pid_of(0));
    assert_eq!(conn.backend_pid().unwrap(), server.backend_pid_of(1));
}

#[test]
fn test_reset_after_server_goes_away() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder());
    let mut conn = Connection::new(&server.conninfo()).unwrap();

    server.stop();
    drop(server);
    // The listener task observes shutdown asynchronously.
    std::thread::sleep(std::time::Duration::from_millis(50));

    let err = conn.reset().unwrap_err();
    assert!(err.is_connection_error());
    assert!(err.as_connection_error().unwrap().connection().is_none());
    assert_eq!(conn.phase(), HandlePhase::Failed);
    assert_eq!(conn.status().unwrap(), ConnectionStatus::Bad);
    assert!(!conn.error_message().unwrap().is_empty());
}

#[test]
fn test_reset_recovers_failed_handle() {
    let rt = common::runtime();
    let server = common::start(
        &rt,
        MockVerticaServer::builder().with_dropped_connections(1),
    );

    let err = Connection::new(&format!("{} user=dbadmin", server.conninfo())).unwrap_err();
    let mut conn = failed_handle(err);
    assert_eq!(conn.phase(), HandlePhase::Failed);
    assert_eq!(conn.status().unwrap(), ConnectionStatus::Bad);
    assert_eq!(conn.backend_pid().unwrap(), 0);

    conn.reset().unwrap();

    assert_eq!(conn.phase(), HandlePhase::Bound);
    assert_eq!(conn.status().unwrap(), ConnectionStatus::Ok);
    assert_eq!(conn.error_message().unwrap(), "");
    assert_eq!(conn.user().unwrap(), "dbadmin");
    assert_eq!(conn.backend_pid().unwrap(), server.backend_pid_of(1));
}

#[test]
fn test_reset_flag_is_exact() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder());
    let mut conn = Connection::new(&server.conninfo()).unwrap();

    for flag in [Value::Bool(false), Value::Nil, Value::Int(1), Value::from("true")] {
        conn.reset_with(&flag).unwrap();
        assert_eq!(conn.phase(), HandlePhase::Bound, "{flag:?}");
    }
}

#[test]
fn test_six_field_form() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder().with_user("dbadmin", "pw"));

    let args = vec![
        Value::from(server.host()),
        Value::from(server.port()),
        Value::Nil,
        Value::from("vmart"),
        Value::from("dbadmin"),
        Value::from("pw"),
    ];
    let conn = Connection::from_args(&args).unwrap();
    assert_eq!(conn.status().unwrap(), ConnectionStatus::Ok);
    assert_eq!(conn.db().unwrap(), "vmart");
    assert_eq!(conn.port().unwrap(), server.port().to_string());

    let fields = LoginFields {
        host: Some(server.host()),
        port: Some(String::new()),
        ..LoginFields::default()
    };
    // An empty port selects the default port.
    let config = LoginParams::from_fields(fields).to_config().unwrap();
    assert_eq!(config.effective_port(), "5433");
}

#[test]
fn test_cancel_token_reaches_server() {
    let rt = common::runtime();
    let server = common::start(&rt, MockVerticaServer::builder().with_backend_pid(55));
    let conn = Connection::new(&server.conninfo()).unwrap();

    let token = conn.cancel_token().unwrap();
    assert_eq!(token.backend_pid(), 55);
    std::thread::spawn(move || token.cancel().unwrap())
        .join()
        .unwrap();

    let requests = common::eventually(&rt, || server.cancel_requests(), |r| !r.is_empty());
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, 55);
}

#[test]
fn test_cancel_token_requires_ready_session() {
    let err = Connection::new("port=0").unwrap_err();
    let conn = failed_handle(err);
    assert!(conn.cancel_token().unwrap_err().is_not_connected());
}
