//! Transaction player: the mock peer's state machine.
//!
//! `Created -> Bound/Connected -> PlayingTransaction(i) -> ... -> Finished`,
//! with `Errored` when the endpoint cannot be opened and `Terminated` when a
//! stop request is observed. Outcomes are written to the report channel in
//! script order, one record per chunk, flushed as they are produced.

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::control::StopSignal;
use super::endpoint::{self, Opened};
use super::exit::PeerExit;
use super::outcome::{evaluate, ChunkOutcome};
use super::protocol::LaunchRequest;
use super::script::{ChunkRole, NetworkChunk};

/// The established connection chunks are played on.
enum Connection {
    /// `pending` holds bytes read past the previous expect chunk that the
    /// next expect chunk of the same transaction consumes first.
    Stream {
        stream: TcpStream,
        pending: Vec<u8>,
    },
    /// `peer` is the default destination: fixed for clients, the sender of
    /// the latest datagram for servers.
    Datagram {
        socket: UdpSocket,
        peer: Option<SocketAddr>,
        connected: bool,
    },
}

enum Step {
    Done(ChunkOutcome),
    Stopped,
}

/// Play `request` and write every outcome to `report`.
pub async fn run_peer<W>(request: &LaunchRequest, stop: StopSignal, report: &mut W) -> PeerExit
where
    W: AsyncWrite + Unpin,
{
    let span = info_span!(
        "peer",
        run_id = %request.run_id,
        transport = ?request.endpoint.transport,
        role = ?request.endpoint.role,
    );
    play(request, stop, report).instrument(span).await
}

async fn play<W>(request: &LaunchRequest, mut stop: StopSignal, report: &mut W) -> PeerExit
where
    W: AsyncWrite + Unpin,
{
    if let Err(e) = request.validate() {
        error!(error = %e, "invalid launch request");
        return PeerExit::RuntimeError;
    }

    let opened = match endpoint::open(&request.endpoint, &request.options).await {
        Ok(opened) => opened,
        Err(e) => {
            error!(error = %e, "endpoint could not be opened");
            return PeerExit::SocketCreation;
        }
    };
    let port = match opened.local_port() {
        Ok(port) => port,
        Err(e) => {
            error!(error = %e, "endpoint has no local address");
            return PeerExit::SocketCreation;
        }
    };
    if let Err(e) = write_flush(report, &port.to_be_bytes()).await {
        error!(error = %e, "report channel closed before ready");
        return PeerExit::RuntimeError;
    }
    info!(port, "endpoint ready");

    let mut conn = match opened {
        Opened::Listener(listener) => {
            let accepted = tokio::select! {
                biased;
                _ = stop.requested() => None,
                r = listener.accept() => Some(r),
            };
            match accepted {
                None => return stopped(report).await,
                Some(Ok((stream, from))) => {
                    info!(%from, "connection accepted");
                    Connection::Stream {
                        stream,
                        pending: Vec::new(),
                    }
                }
                Some(Err(e)) => {
                    error!(error = %e, "accept failed");
                    return PeerExit::SocketCreation;
                }
            }
        }
        Opened::Stream(stream) => Connection::Stream {
            stream,
            pending: Vec::new(),
        },
        Opened::Datagram(socket) => {
            let peer = socket.peer_addr().ok();
            Connection::Datagram {
                connected: peer.is_some(),
                socket,
                peer,
            }
        }
    };

    let window = request.options.overflow_window.clamp(1, u8::MAX as usize);
    for (t, transaction) in request.transactions.transactions.iter().enumerate() {
        info!(transaction = t, chunks = transaction.chunks.len(), "transaction started");
        let mut failures = 0usize;
        for (c, chunk) in transaction.chunks.iter().enumerate() {
            if stop.is_requested() {
                return stopped(report).await;
            }
            let carry = transaction
                .chunks
                .get(c + 1)
                .is_some_and(|next| next.role == ChunkRole::Expect);
            let outcome = match play_chunk(&mut conn, chunk, window, carry, &mut stop).await {
                Step::Done(outcome) => outcome,
                Step::Stopped => return stopped(report).await,
            };
            if !outcome.is_ok() {
                failures += 1;
                debug!(transaction = t, chunk = c, flags = outcome.flags(), "chunk failed");
            }
            if let Err(e) = write_flush(report, &outcome.encode()).await {
                error!(error = %e, "report channel write failed");
                return PeerExit::RuntimeError;
            }
        }
        info!(transaction = t, failures, "transaction finished");
    }
    info!("script finished");
    PeerExit::Completed
}

async fn play_chunk(
    conn: &mut Connection,
    chunk: &NetworkChunk,
    window: usize,
    carry: bool,
    stop: &mut StopSignal,
) -> Step {
    match chunk.role {
        ChunkRole::Send => Step::Done(match send(conn, &chunk.payload).await {
            Ok(()) => ChunkOutcome::ok(),
            Err(e) => {
                warn!(error = %e, "send failed");
                ChunkOutcome::send_error()
            }
        }),
        ChunkRole::Expect => receive(conn, &chunk.payload, window, carry, stop).await,
    }
}

/// Write the whole payload. Never interrupted by a stop request.
async fn send(conn: &mut Connection, payload: &[u8]) -> io::Result<()> {
    match conn {
        Connection::Stream { stream, .. } => stream.write_all(payload).await,
        Connection::Datagram {
            socket,
            peer,
            connected,
        } => {
            let sent = match (*connected, *peer) {
                (true, _) => socket.send(payload).await?,
                (false, Some(addr)) => socket.send_to(payload, addr).await?,
                (false, None) => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotConnected,
                        "no datagram received yet, destination unknown",
                    ))
                }
            };
            if sent != payload.len() {
                return Err(io::ErrorKind::WriteZero.into());
            }
            Ok(())
        }
    }
}

/// Read one expected chunk, racing every read against the stop request.
///
/// On a stream, bytes past the chunk are kept for the next expect chunk
/// when `carry` is set. Otherwise they, and anything already queued on the
/// socket up to `window` bytes, count as surplus.
async fn receive(
    conn: &mut Connection,
    expected: &[u8],
    window: usize,
    carry: bool,
    stop: &mut StopSignal,
) -> Step {
    match conn {
        Connection::Stream { stream, pending } => {
            let mut got = std::mem::take(pending);
            let mut buf = vec![0u8; expected.len() + window];
            while got.len() < expected.len() {
                let want = expected.len() - got.len() + window;
                let read = tokio::select! {
                    biased;
                    _ = stop.requested() => return Step::Stopped,
                    r = stream.read(&mut buf[..want]) => r,
                };
                match read {
                    Ok(0) => break,
                    Ok(n) => got.extend_from_slice(&buf[..n]),
                    Err(e) => {
                        warn!(error = %e, "receive failed");
                        return Step::Done(ChunkOutcome::receive_error());
                    }
                }
            }
            if got.len() < expected.len() {
                return Step::Done(evaluate(expected, &got));
            }
            let mut surplus = got.split_off(expected.len());
            if carry {
                *pending = surplus;
                return Step::Done(evaluate(expected, &got));
            }
            while surplus.len() < window {
                match stream.try_read(&mut buf[..window - surplus.len()]) {
                    Ok(0) => break,
                    Ok(n) => surplus.extend_from_slice(&buf[..n]),
                    Err(_) => break,
                }
            }
            if surplus.is_empty() {
                Step::Done(evaluate(expected, &got))
            } else {
                Step::Done(ChunkOutcome::too_much(surplus.len()))
            }
        }
        Connection::Datagram {
            socket,
            peer,
            connected,
        } => {
            let mut buf = vec![0u8; expected.len() + window];
            let read = tokio::select! {
                biased;
                _ = stop.requested() => return Step::Stopped,
                r = socket.recv_from(&mut buf) => r,
            };
            match read {
                Ok((n, from)) => {
                    if !*connected {
                        *peer = Some(from);
                    }
                    Step::Done(evaluate(expected, &buf[..n]))
                }
                Err(e) => {
                    warn!(error = %e, "receive failed");
                    Step::Done(ChunkOutcome::receive_error())
                }
            }
        }
    }
}

/// Record the stop and leave. Nothing more goes to the remote socket.
async fn stopped<W: AsyncWrite + Unpin>(report: &mut W) -> PeerExit {
    info!("stop observed, terminating");
    if let Err(e) = write_flush(report, &ChunkOutcome::exit_process().encode()).await {
        debug!(error = %e, "could not report stop");
    }
    PeerExit::StopRequested
}

async fn write_flush<W: AsyncWrite + Unpin>(report: &mut W, bytes: &[u8]) -> io::Result<()> {
    report.write_all(bytes).await?;
    report.flush().await
}
