//! The relay loop
//!
//! Terminates a length-prefixed byte pipe on one side and an outbound
//! socket on the other, forwarding payloads in both directions without
//! interpreting them. Per-direction order is preserved; the two directions
//! are independent.
//!
//! The socket side reconnects on drop with a fixed delay, up to a bounded
//! number of consecutive failures. A socket error before the first
//! successful open is surfaced upward instead — at that point the relay
//! has no one to report buffered failures to. Frames arriving from the
//! pipe while the socket is down are dropped, not queued: callers treat a
//! reconnect window as "peer unavailable".

use bytes::{Bytes, BytesMut};
use conduit_domain::transport::reconnect::ReconnectState;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::framing::{FramingError, encode_frame, extract_frames};
use crate::channels::socket::host_port;

/// Default bound on consecutive failed reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default fixed delay between reconnect attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket target, `host:port` or `tcp://host:port`
    pub url: String,
    pub max_attempts: u32,
    pub retry_interval: Duration,
}

impl RelayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Error type for the relay process
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connect to {addr} failed before first open: {source}")]
    InitialConnect {
        addr: String,
        source: std::io::Error,
    },

    #[error("Reconnect budget exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error(transparent)]
    Framing(#[from] FramingError),
}

/// Run the relay over this process's stdin/stdout.
pub async fn run(config: RelayConfig) -> Result<(), RelayError> {
    run_with_io(config, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Run the relay over arbitrary pipe halves.
pub async fn run_with_io<R, W>(
    config: RelayConfig,
    pipe_in: R,
    mut pipe_out: W,
) -> Result<(), RelayError>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Unpin,
{
    let addr = host_port(&config.url).to_string();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Bytes>();

    // Pipe reader task: accumulate bytes, hand off every complete frame.
    // Losing the pipe (or a desynchronized stream) ends the relay.
    let mut reader_task = tokio::spawn(async move {
        let mut pipe_in = pipe_in;
        let mut buffer = BytesMut::with_capacity(8 * 1024);
        loop {
            match pipe_in.read_buf(&mut buffer).await {
                Ok(0) => {
                    debug!("relay pipe closed");
                    return Ok(());
                }
                Ok(_) => {
                    for frame in extract_frames(&mut buffer)? {
                        if frame_tx.send(frame).is_err() {
                            return Ok(());
                        }
                    }
                }
                Err(e) => return Err(RelayError::Io(e)),
            }
        }
    });

    let mut state = ReconnectState::new(config.max_attempts, config.retry_interval);
    let mut connected_once = false;

    loop {
        match TcpStream::connect(&addr).await {
            Ok(stream) => {
                state.record_success();
                connected_once = true;
                info!(addr = %addr, "relay socket connected");

                let (read_half, mut write_half) = stream.into_split();
                let mut socket_lines = BufReader::new(read_half).lines();

                loop {
                    tokio::select! {
                        frame = frame_rx.recv() => match frame {
                            Some(payload) => {
                                let mut line = payload.to_vec();
                                line.push(b'\n');
                                if let Err(e) = write_half.write_all(&line).await {
                                    warn!(error = %e, "relay socket write failed");
                                    break;
                                }
                            }
                            None => return finish(&mut reader_task).await,
                        },
                        line = socket_lines.next_line() => match line {
                            Ok(Some(line)) => {
                                pipe_out.write_all(&encode_frame(line.as_bytes())).await?;
                                pipe_out.flush().await?;
                            }
                            Ok(None) => {
                                warn!("relay socket closed by peer");
                                break;
                            }
                            Err(e) => {
                                warn!(error = %e, "relay socket read failed");
                                break;
                            }
                        },
                    }
                }
            }
            Err(e) if !connected_once => {
                return Err(RelayError::InitialConnect { addr, source: e });
            }
            Err(e) => {
                let attempt = state.record_failure();
                if state.should_report() {
                    warn!(
                        addr = %addr,
                        attempt,
                        max = config.max_attempts,
                        error = %e,
                        "relay reconnect failed"
                    );
                }
                if state.exhausted() {
                    return Err(RelayError::ReconnectExhausted { attempts: attempt });
                }
            }
        }

        // Fixed delay before the next attempt. Frames arriving while the
        // socket is down are dropped, not queued.
        let delay = tokio::time::sleep(config.retry_interval);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => break,
                frame = frame_rx.recv() => match frame {
                    Some(_) => debug!("dropping frame while socket disconnected"),
                    None => return finish(&mut reader_task).await,
                },
            }
        }
    }
}

/// Join the pipe reader so its error (lost pipe, desynchronized stream)
/// becomes the relay's exit status.
async fn finish(
    reader_task: &mut tokio::task::JoinHandle<Result<(), RelayError>>,
) -> Result<(), RelayError> {
    match reader_task.await {
        Ok(result) => result,
        Err(_) => Ok(()),
    }
}
