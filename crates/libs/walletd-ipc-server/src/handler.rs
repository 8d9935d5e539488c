use std::io::{self, ErrorKind};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::LinesCodecError;
use walletd_ipc::codec::{self, FramedStream};
use walletd_ipc::{Response, RpcError};

use crate::dispatch::{decode_request, dispatch};
use crate::server::ServerContext;

enum Flow {
    Continue,
    Close,
}

/// Serves one accepted connection until the peer hangs up, a write hits a
/// dead peer, or shutdown is observed.
pub(crate) struct ConnectionHandler {
    id: u64,
    framed: FramedStream,
    context: Arc<ServerContext>,
}

impl ConnectionHandler {
    pub(crate) fn new(id: u64, stream: UnixStream, context: Arc<ServerContext>) -> Self {
        let framed = codec::framed(stream, context.config.max_frame_len);
        Self { id, framed, context }
    }

    pub(crate) async fn run(mut self) {
        log::debug!("walletd connection opened conn={}", self.id);
        loop {
            if self.context.shutdown.is_cancelled() {
                log::debug!("walletd connection closing on shutdown conn={}", self.id);
                break;
            }
            let poll = self.context.config.poll_interval;
            let next = match tokio::time::timeout(poll, self.framed.next()).await {
                Ok(next) => next,
                Err(_elapsed) => continue,
            };
            let flow = match next {
                None => Flow::Close,
                Some(Ok(line)) => self.handle_line(&line).await,
                Some(Err(err)) => self.reject_frame(err).await,
            };
            if let Flow::Close = flow {
                break;
            }
        }
        log::debug!("walletd connection closed conn={}", self.id);
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        let line = line.trim();
        if line.is_empty() {
            return Flow::Continue;
        }
        if let Some(observer) = &self.context.observer {
            observer(line);
        }

        let request = match decode_request(line) {
            Ok(request) => request,
            Err((id, error)) => {
                log::debug!("walletd rejected frame conn={} err={error}", self.id);
                return self.respond(&Response::failure(id, error)).await;
            }
        };

        let outcome = match self.context.lock.acquire(self.context.config.lock_timeout).await {
            Some(guard) => {
                log::debug!("walletd dispatching conn={} method={}", self.id, request.method);
                let outcome = dispatch(&self.context.registry, &request).await;
                drop(guard);
                outcome
            }
            None => {
                log::warn!(
                    "walletd timed out waiting for lock conn={} method={}",
                    self.id,
                    request.method
                );
                Err(RpcError::lock_timeout())
            }
        };

        if request.is_notification() {
            if let Err(error) = &outcome {
                log::warn!("walletd notification failed method={} err={error}", request.method);
            }
            return Flow::Continue;
        }
        self.respond(&Response::from_result(request.id, outcome)).await
    }

    /// The line codec stops yielding frames after a decode error, so the
    /// connection closes after the error reply.
    async fn reject_frame(&mut self, err: LinesCodecError) -> Flow {
        let error = match err {
            LinesCodecError::MaxLineLengthExceeded => {
                RpcError::invalid_request("frame exceeds maximum length")
            }
            LinesCodecError::Io(err) if err.kind() == ErrorKind::InvalidData => {
                RpcError::parse_error(err)
            }
            LinesCodecError::Io(err) => {
                log::debug!("walletd read failed conn={} err={err}", self.id);
                return Flow::Close;
            }
        };
        log::warn!("walletd rejected frame conn={} err={error}", self.id);
        self.respond(&Response::failure(None, error)).await;
        Flow::Close
    }

    async fn respond(&mut self, response: &Response) -> Flow {
        let line = match codec::encode_line(response) {
            Ok(line) => line,
            Err(err) => {
                log::error!("walletd failed to encode response conn={} err={err}", self.id);
                return Flow::Continue;
            }
        };
        match self.framed.send(line).await.map_err(codec::into_io_error) {
            Ok(()) => Flow::Continue,
            Err(err) if is_disconnect(&err) => {
                log::debug!("walletd peer went away before response conn={} err={err}", self.id);
                Flow::Close
            }
            Err(err) => {
                log::warn!("walletd failed to write response conn={} err={err}", self.id);
                Flow::Continue
            }
        }
    }
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}
