//! Binary entrypoint for the TeachBack tutor server.

use std::process::ExitCode;

use teachback::start_tutor;

/// Serve the tutor API and static client until Ctrl+C.
fn main() -> ExitCode {
    start_tutor::run()
}
