//! Shared helpers for the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Runtime;
use vertica_client::{Connection, PollingStatus};
use vertica_testing::{MockServerBuilder, MockVerticaServer};

/// Upper bound on poll iterations before a test gives up.
const MAX_POLLS: usize = 10_000;

/// A runtime whose worker threads serve the mock while the test thread
/// makes blocking client calls.
pub fn runtime() -> Runtime {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

/// Start a mock server on `rt`.
pub fn start(rt: &Runtime, builder: MockServerBuilder) -> MockVerticaServer {
    rt.block_on(builder.build()).unwrap()
}

/// Drive a non-blocking connect or reset to a terminal status, recording
/// every intermediate status.
pub fn drive(conn: &mut Connection) -> (PollingStatus, Vec<PollingStatus>) {
    let mut seen = Vec::new();
    for _ in 0..MAX_POLLS {
        let status = conn.poll().unwrap();
        if status.is_terminal() {
            return (status, seen);
        }
        seen.push(status);
        if status != PollingStatus::Active {
            // A real caller would wait on conn.socket() here.
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    panic!("negotiation did not finish after {MAX_POLLS} polls");
}

/// Poll an async server counter until `done` holds or a second passes.
pub fn eventually<F, Fut>(rt: &Runtime, mut fetch: F, done: impl Fn(&Fut::Output) -> bool) -> Fut::Output
where
    F: FnMut() -> Fut,
    Fut: Future,
{
    for _ in 0..100 {
        let value = rt.block_on(fetch());
        if done(&value) {
            return value;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    rt.block_on(fetch())
}
