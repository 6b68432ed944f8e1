//! Skips socket-bound tests in sandboxes that cannot bind loopback.
//!
//! Set `HFETCH_REQUIRE_SOCKET_TESTS=1` in CI to turn a skip into a failure.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "HFETCH_REQUIRE_SOCKET_TESTS";

fn skips_forbidden() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// True when loopback cannot be bound and the caller should return early.
///
/// Panics instead when skips are forbidden.
#[track_caller]
#[must_use]
pub fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }
    let caller = Location::caller();
    assert!(
        !skips_forbidden(),
        "{}:{}: loopback unavailable and {REQUIRE_ENV} is set",
        caller.file(),
        caller.line()
    );
    eprintln!(
        "{}:{}: loopback unavailable, skipping (set {REQUIRE_ENV}=1 to fail instead)",
        caller.file(),
        caller.line()
    );
    true
}

/// Starts a wiremock server, or `None` when the test should be skipped.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl Future<Output = Option<MockServer>> {
    let skip = should_skip_socket_bound_test();
    async move {
        if skip {
            None
        } else {
            Some(MockServer::start().await)
        }
    }
}
