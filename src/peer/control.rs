//! Control channel: the launch request, then the stop signal.
//!
//! The channel is read on a plain thread, not on the runtime: a blocking
//! read of stdin cannot be cancelled and would hold up runtime shutdown.
//! The thread is detached and dies with the process.

use std::io::{self, Read};
use std::thread;

use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

use super::protocol::{read_launch, LaunchRequest, ProtocolError};

/// Receiving side of a stop request.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

/// Sending side of a stop request.
#[derive(Debug)]
pub struct StopTrigger {
    tx: watch::Sender<bool>,
}

impl StopSignal {
    /// A linked trigger and signal.
    pub fn pair() -> (StopTrigger, StopSignal) {
        let (tx, rx) = watch::channel(false);
        (StopTrigger { tx }, StopSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> StopSignal {
        let (trigger, signal) = Self::pair();
        // Dropping the sender keeps the last value: false.
        drop(trigger);
        signal
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once a stop has been requested. Pends forever if the trigger
    /// is dropped without firing.
    pub async fn requested(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl StopTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Read the launch request from `reader`, then watch it for a stop byte.
///
/// End of stream after the request is not a stop request.
pub fn spawn_control_reader<R>(
    mut reader: R,
) -> (oneshot::Receiver<Result<LaunchRequest, ProtocolError>>, StopSignal)
where
    R: Read + Send + 'static,
{
    let (request_tx, request_rx) = oneshot::channel();
    let (trigger, signal) = StopSignal::pair();
    thread::spawn(move || {
        let request = read_launch(&mut reader);
        let ok = request.is_ok();
        if request_tx.send(request).is_err() || !ok {
            return;
        }
        if wait_for_stop_byte(&mut reader) {
            info!("stop requested on control channel");
            trigger.trigger();
        }
    });
    (request_rx, signal)
}

fn wait_for_stop_byte<R: Read>(reader: &mut R) -> bool {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => {
                debug!("control channel closed");
                return false;
            }
            Ok(_) => return true,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "control channel read failed");
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::endpoint::{AddressFamily, EndpointSpec, PeerOptions, Transport};
    use crate::peer::protocol::encode_launch;
    use crate::peer::script::TransactionSet;
    use std::time::Duration;

    fn request() -> LaunchRequest {
        LaunchRequest {
            run_id: uuid::Uuid::new_v4(),
            endpoint: EndpointSpec::server(Transport::Stream, AddressFamily::Inet, 0),
            transactions: TransactionSet::default(),
            options: PeerOptions::default(),
        }
    }

    #[tokio::test]
    async fn trigger_wakes_waiter() {
        let (trigger, mut signal) = StopSignal::pair();
        assert!(!signal.is_requested());
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), signal.requested())
            .await
            .unwrap();
        assert!(signal.is_requested());
    }

    #[tokio::test]
    async fn never_signal_stays_pending() {
        let mut signal = StopSignal::never();
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.requested()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn byte_after_frame_is_a_stop() {
        let mut bytes = encode_launch(&request()).unwrap();
        bytes.push(b'x');
        let (rx, mut signal) = spawn_control_reader(io::Cursor::new(bytes));
        let received = rx.await.unwrap().unwrap();
        assert_eq!(received.endpoint.port, 0);
        tokio::time::timeout(Duration::from_secs(1), signal.requested())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn eof_after_frame_is_not_a_stop() {
        let bytes = encode_launch(&request()).unwrap();
        let (rx, signal) = spawn_control_reader(io::Cursor::new(bytes));
        rx.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!signal.is_requested());
    }
}
