//! TCP bridge mode: many clients, one device link.
//!
//! Bridge mode does no decoding at all — whatever bytes a client sends are
//! written to the device verbatim, and the raw response frame comes back.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::error::BmsError;
use crate::link::{LinkSession, RESPONSE_TIMEOUT};

/// Largest request a client may send in one cycle. Requests carry their own
/// terminator, so there is no length framing on the socket.
const MAX_REQUEST_LEN: usize = 1024;

/// Serializes concurrent clients onto the single device link.
///
/// The BMS characteristic is stateful and services one command at a time, so
/// exclusive access over the whole submit/await pair is required correctness:
/// without it, two clients' response bytes would interleave in the frame
/// accumulator. The guard is a real mutex held across both calls, not a flag.
pub struct Multiplexer {
    session: Arc<LinkSession>,
    guard: Mutex<()>,
    timeout: Duration,
}

impl Multiplexer {
    pub fn new(session: Arc<LinkSession>) -> Self {
        Self::with_timeout(session, RESPONSE_TIMEOUT)
    }

    pub fn with_timeout(session: Arc<LinkSession>, timeout: Duration) -> Self {
        Self {
            session,
            guard: Mutex::new(()),
            timeout,
        }
    }

    /// Run one full request/response cycle on behalf of a client and return
    /// the raw response frame.
    pub async fn handle(&self, request: &[u8]) -> Result<Vec<u8>, BmsError> {
        let _exclusive = self.guard.lock().await;
        self.session.submit(request).await?;
        self.session.await_response(self.timeout).await
    }
}

/// Accept loop: one task per client connection, all funneled through the
/// multiplexer.
pub async fn serve(listener: TcpListener, mux: Arc<Multiplexer>) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = listener.accept().await?;
        info!("accepted connection from {peer}");
        let mux = mux.clone();
        tokio::spawn(async move {
            match handle_client(socket, &mux).await {
                Ok(()) => info!("client {peer} disconnected"),
                Err(err) => warn!("client {peer} dropped: {err}"),
            }
        });
    }
}

async fn handle_client(mut socket: TcpStream, mux: &Multiplexer) -> anyhow::Result<()> {
    let mut buf = [0u8; MAX_REQUEST_LEN];
    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        debug!("client request: {}", hex::encode(&buf[..n]));

        match mux.handle(&buf[..n]).await {
            Ok(frame) => socket.write_all(&frame).await?,
            Err(err @ BmsError::Timeout(_)) => {
                // the client gets nothing back for this cycle but may retry
                // on the same connection
                warn!("BMS timed out: {err}");
            }
            Err(err) => return Err(err.into()),
        }
    }
}
