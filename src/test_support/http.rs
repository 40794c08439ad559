use std::panic::{self, AssertUnwindSafe};

use httpmock::MockServer;

/// Starts a fresh `httpmock::MockServer`, or `None` when the sandbox forbids binding a port.
pub fn start_mock_server() -> Option<MockServer> {
    panic::catch_unwind(AssertUnwindSafe(MockServer::start)).ok()
}
