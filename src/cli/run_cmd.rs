//! `ctester-peer run`: the mock peer process body.
//!
//! stdin is the control channel, stdout the report channel. Logs go to
//! stderr so they never corrupt the report stream.

use tracing::error;

use crate::config;
use crate::peer::{run_peer, spawn_control_reader, PeerExit};
use crate::telemetry::init_logging;

/// Read the launch request from stdin, play it, and return the exit status.
pub async fn run() -> PeerExit {
    let env = config::load();
    if let Err(e) = init_logging(&env.log) {
        eprintln!("ctester-peer: logging disabled: {}", e);
    }

    let (request, stop) = spawn_control_reader(std::io::stdin());
    let request = match request.await {
        Ok(Ok(request)) => request,
        Ok(Err(e)) => {
            error!(error = %e, "no usable launch request");
            return PeerExit::RuntimeError;
        }
        Err(_) => {
            error!("control reader exited without a launch request");
            return PeerExit::RuntimeError;
        }
    };

    let mut report = tokio::io::stdout();
    run_peer(&request, stop, &mut report).await
}
