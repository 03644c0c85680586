use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use log::debug;
use tokio::sync::{Mutex, Notify};

use crate::error::BmsError;
use crate::frame::FrameAccumulator;

/// How long a caller waits for a complete response frame.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// The write half of the device link. The BLE client implements this over
/// the write characteristic; tests substitute their own.
pub trait RequestSink: Send + Sync {
    fn send<'a>(&'a self, request: &'a [u8]) -> BoxFuture<'a, Result<(), BmsError>>;
}

/// Where the session is in its single request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    AwaitingResponse,
    ResponseReady,
    TimedOut,
    Closed,
}

struct Inner {
    state: LinkState,
    accumulator: FrameAccumulator,
    /// Bumped on every submit. Outcomes are tagged with the generation they
    /// completed under, so a frame finishing after its cycle timed out is
    /// recognizable as stale and never delivered to a later caller.
    generation: u64,
    outcome: Option<(u64, Result<Vec<u8>, BmsError>)>,
}

/// Drives exactly one request/response cycle against the BMS at a time.
///
/// Requests go out through the [`RequestSink`]; response bytes come back in
/// via [`on_chunk`](Self::on_chunk) from whichever task owns the notification
/// stream. At most one request may be outstanding; callers that need to share
/// a session go through [`Multiplexer`](crate::bridge::Multiplexer), which
/// provides that exclusion.
///
/// A timeout does not cancel the in-flight device request. The next `submit`
/// resets the accumulator and discards any undelivered outcome, so a late
/// frame from a timed-out cycle is dropped rather than handed to the wrong
/// caller.
pub struct LinkSession {
    writer: Arc<dyn RequestSink>,
    inner: Mutex<Inner>,
    readable: Notify,
}

impl LinkSession {
    pub fn new(writer: Arc<dyn RequestSink>) -> Self {
        Self {
            writer,
            inner: Mutex::new(Inner {
                state: LinkState::Idle,
                accumulator: FrameAccumulator::new(),
                generation: 0,
                outcome: None,
            }),
            readable: Notify::new(),
        }
    }

    /// Begin a new cycle: clear leftovers from the previous one and forward
    /// the request bytes to the device.
    pub async fn submit(&self, request: &[u8]) -> Result<(), BmsError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.state == LinkState::Closed {
                return Err(BmsError::LinkClosed);
            }
            inner.accumulator.reset();
            inner.outcome = None;
            inner.generation += 1;
            inner.state = LinkState::AwaitingResponse;
        }
        self.writer.send(request).await
    }

    /// Feed one notification chunk into the in-progress frame. Called by the
    /// notification pump; never blocks on waiting callers.
    pub async fn on_chunk(&self, chunk: &[u8]) {
        let mut inner = self.inner.lock().await;
        if inner.state == LinkState::Closed {
            return;
        }
        match inner.accumulator.push(chunk) {
            Ok(None) => {}
            Ok(Some(frame)) => {
                debug!("frame complete: {}", hex::encode(&frame));
                let generation = inner.generation;
                inner.outcome = Some((generation, Ok(frame)));
                if inner.state == LinkState::AwaitingResponse {
                    inner.state = LinkState::ResponseReady;
                }
                self.readable.notify_waiters();
            }
            Err(err) => {
                let generation = inner.generation;
                inner.outcome = Some((generation, Err(err)));
                self.readable.notify_waiters();
            }
        }
    }

    /// Wait for the current cycle's frame, up to `timeout`.
    ///
    /// On timeout the session stays armed (there is no way to cancel the
    /// device-side request); the caller gets [`BmsError::Timeout`] and the
    /// next `submit` cleans up.
    pub async fn await_response(&self, timeout: Duration) -> Result<Vec<u8>, BmsError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let mut readable = std::pin::pin!(self.readable.notified());
            // register for the notification before inspecting state, so a
            // frame completing between the check and the wait still wakes us
            readable.as_mut().enable();
            {
                let mut inner = self.inner.lock().await;
                match inner.outcome.take() {
                    Some((generation, result)) if generation == inner.generation => {
                        inner.state = match result {
                            Ok(_) => LinkState::ResponseReady,
                            Err(_) => LinkState::Idle,
                        };
                        return result;
                    }
                    Some((generation, _)) => {
                        debug!("dropping stale frame from generation {generation}");
                    }
                    None => {}
                }
                if inner.state == LinkState::Closed {
                    return Err(BmsError::LinkClosed);
                }
            }
            if tokio::time::timeout_at(deadline, readable).await.is_err() {
                let mut inner = self.inner.lock().await;
                if inner.state == LinkState::AwaitingResponse {
                    inner.state = LinkState::TimedOut;
                }
                return Err(BmsError::Timeout(timeout));
            }
        }
    }

    /// The device link is gone. Terminal: releases any waiter with
    /// [`BmsError::LinkClosed`] and refuses further submits.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = LinkState::Closed;
        self.readable.notify_waiters();
    }

    #[cfg(test)]
    pub async fn state(&self) -> LinkState {
        self.inner.lock().await.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: StdMutex<Vec<Vec<u8>>>,
    }

    impl RequestSink for RecordingSink {
        fn send<'a>(&'a self, request: &'a [u8]) -> BoxFuture<'a, Result<(), BmsError>> {
            Box::pin(async move {
                self.sent.lock().unwrap().push(request.to_vec());
                Ok(())
            })
        }
    }

    struct FailingSink;

    impl RequestSink for FailingSink {
        fn send<'a>(&'a self, _request: &'a [u8]) -> BoxFuture<'a, Result<(), BmsError>> {
            Box::pin(async { Err(BmsError::WriteFailed("gatt write rejected".into())) })
        }
    }

    fn session() -> Arc<LinkSession> {
        Arc::new(LinkSession::new(Arc::new(RecordingSink::default())))
    }

    #[tokio::test]
    async fn response_assembled_from_chunks_is_delivered() {
        let session = session();
        session.submit(&[0xDD, 0xA5, 0x03]).await.unwrap();

        let feeder = session.clone();
        let feed = tokio::spawn(async move {
            feeder.on_chunk(&[0xDD, 0x03, 0x00]).await;
            feeder.on_chunk(&[0x02, 0xAA, 0xBB]).await;
            feeder.on_chunk(&[0x77]).await;
        });

        let frame = session
            .await_response(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(frame, vec![0xDD, 0x03, 0x00, 0x02, 0xAA, 0xBB, 0x77]);
        assert_eq!(session.state().await, LinkState::ResponseReady);
        feed.await.unwrap();
    }

    #[tokio::test]
    async fn no_chunks_times_out() {
        let session = session();
        session.submit(&[0x01]).await.unwrap();
        let err = session
            .await_response(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, BmsError::Timeout(_)));
        assert_eq!(session.state().await, LinkState::TimedOut);
    }

    #[tokio::test]
    async fn late_frame_from_timed_out_cycle_is_not_delivered_later() {
        let session = session();

        session.submit(&[0x01]).await.unwrap();
        let err = session
            .await_response(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, BmsError::Timeout(_)));

        // the device answers after the caller has given up
        session.on_chunk(&[0xEE, 0x77]).await;

        // the next cycle must see only its own response
        session.submit(&[0x02]).await.unwrap();
        session.on_chunk(&[0xAB, 0x77]).await;
        let frame = session
            .await_response(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(frame, vec![0xAB, 0x77]);
    }

    #[tokio::test]
    async fn submit_resets_partial_bytes() {
        let session = session();
        session.submit(&[0x01]).await.unwrap();
        session.on_chunk(&[0xDE, 0xAD]).await; // incomplete

        session.submit(&[0x02]).await.unwrap();
        session.on_chunk(&[0x01, 0x77]).await;
        let frame = session
            .await_response(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(frame, vec![0x01, 0x77]);
    }

    #[tokio::test]
    async fn overflow_surfaces_to_the_waiter() {
        let session = session();
        session.submit(&[0x01]).await.unwrap();
        session
            .on_chunk(&vec![0u8; crate::frame::MAX_FRAME_LEN + 1])
            .await;
        let err = session
            .await_response(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BmsError::FrameOverflow { .. }));
    }

    #[tokio::test]
    async fn close_releases_the_waiter_and_rejects_submits() {
        let session = session();
        session.submit(&[0x01]).await.unwrap();

        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.await_response(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        session.close().await;

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, BmsError::LinkClosed));

        let err = session.submit(&[0x02]).await.unwrap_err();
        assert!(matches!(err, BmsError::LinkClosed));
    }

    #[tokio::test]
    async fn write_failure_surfaces_from_submit() {
        let session = LinkSession::new(Arc::new(FailingSink));
        let err = session.submit(&[0x01]).await.unwrap_err();
        assert!(matches!(err, BmsError::WriteFailed(_)));
    }

    #[tokio::test]
    async fn request_bytes_reach_the_sink_verbatim() {
        let sink = Arc::new(RecordingSink::default());
        let session = LinkSession::new(sink.clone());
        session
            .submit(&crate::message::GENERIC_INFO_REQUEST)
            .await
            .unwrap();
        assert_eq!(
            sink.sent.lock().unwrap().as_slice(),
            &[crate::message::GENERIC_INFO_REQUEST.to_vec()]
        );
    }
}
