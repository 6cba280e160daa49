//! Async handle on a running station engine.
//!
//! [`StationConnection`] spawns the engine through the [`Driver`] and exposes its
//! output as a [`SampleStream`]. The stream is lazy, unbounded until cancelled and
//! can be taken only once. Dropping either the stream or the connection cancels
//! the engine.

use futures::Stream;
use jiff::civil::DateTime;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::driver::Driver;
use crate::live::StatusRequest;
use crate::transport::PacketChannel;
use crate::types::{Sample, StationStatus};
use crate::{Result, StationConfig, StationError};


/// How long a status query waits for the engine to answer.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

pin_project! {
    /// Samples produced by the engine, ending with at most one terminal error.
    ///
    /// Dropping the stream stops the engine.
    #[derive(Debug)]
    pub struct SampleStream {
        #[pin]
        inner: UnboundedReceiverStream<Result<Sample>>,
        _guard: DropGuard,
    }
}

impl Stream for SampleStream {
    type Item = Result<Sample>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Connection to one station, running on its own blocking task
#[derive(Debug)]
pub struct StationConnection {
    samples: Option<mpsc::UnboundedReceiver<Result<Sample>>>,
    status: mpsc::UnboundedSender<StatusRequest>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StationConnection {
    /// Start the engine on `channel` using the system clock.
    ///
    /// History stamped after `resume_since` is replayed before live streaming
    /// begins. Must be called from within a tokio runtime.
    pub fn start<C>(channel: C, config: StationConfig, resume_since: Option<DateTime>) -> Self
    where
        C: PacketChannel + 'static,
    {
        Self::start_with_clock(channel, SystemClock, config, resume_since)
    }

    pub fn start_with_clock<C, K>(
        channel: C,
        clock: K,
        config: StationConfig,
        resume_since: Option<DateTime>,
    ) -> Self
    where
        C: PacketChannel + 'static,
        K: Clock + 'static,
    {
        let channels = Driver::spawn(channel, clock, config, resume_since);
        info!("Station connection started");
        Self {
            samples: Some(channels.samples),
            status: channels.status,
            cancel: channels.cancel,
            task: Some(channels.task),
        }
    }

    /// Take the sample stream. Returns `None` after the first call.
    pub fn samples(&mut self) -> Option<SampleStream> {
        let receiver = self.samples.take()?;
        Some(SampleStream {
            inner: UnboundedReceiverStream::new(receiver),
            _guard: self.cancel.clone().drop_guard(),
        })
    }

    /// Ask the engine for a status snapshot.
    pub async fn status(&self) -> Result<StationStatus> {
        let (reply, answer) = oneshot::channel();
        self.status.send(StatusRequest { reply }).map_err(|_| StationError::Shutdown)?;

        match tokio::time::timeout(STATUS_TIMEOUT, answer).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(_)) => Err(StationError::Shutdown),
            Err(_) => Err(StationError::Timeout { duration: STATUS_TIMEOUT }),
        }
    }

    /// Whether the engine task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the engine and wait for it to release the transport.
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| StationError::transport_with_source("engine task", Box::new(e)))?;
        }
        debug!("Station connection shut down");
        Ok(())
    }
}

impl Drop for StationConnection {
    fn drop(&mut self) {
        debug!("Dropping station connection");
        // Cancel tasks on drop for clean shutdown
        self.cancel.cancel();
    }
}
