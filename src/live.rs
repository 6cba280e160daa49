//! Steady-state streaming loop.
//!
//! Each iteration answers pending status requests, runs a scheduled history pass
//! if the ring crossed its watermark, performs one bounded read, and checks the
//! heartbeat deadline. Cancellation is checked at the top of every iteration, so
//! shutdown latency is bounded by the read timeout.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::clock::Clock;
use crate::codec::{self, Frame, Packet};
use crate::decoder::reading_from_frame;
use crate::history::{self, SyncOptions};
use crate::session::{Link, SampleSink, Session};
use crate::transport::PacketChannel;
use crate::types::{Provenance, SessionState, StationStatus};
use crate::{Result, StationConfig, StationError};

/// A status query routed to the engine thread.
#[derive(Debug)]
pub struct StatusRequest {
    pub reply: oneshot::Sender<StationStatus>,
}

/// Cancellation and supervisory requests for the engine thread.
#[derive(Debug)]
pub struct Control {
    cancel: CancellationToken,
    requests: Option<mpsc::UnboundedReceiver<StatusRequest>>,
}

impl Control {
    pub fn new(cancel: CancellationToken, requests: mpsc::UnboundedReceiver<StatusRequest>) -> Self {
        Self { cancel, requests: Some(requests) }
    }

    /// Control that is never cancelled and serves no requests.
    pub fn detached() -> Self {
        Self { cancel: CancellationToken::new(), requests: None }
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self { cancel, requests: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Answer every queued status request without blocking.
    pub fn serve_status(&mut self, session: &Session) {
        let Some(requests) = self.requests.as_mut() else {
            return;
        };
        while let Ok(request) = requests.try_recv() {
            // The requester may have given up waiting.
            let _ = request.reply.send(session.status());
        }
    }
}

/// Stream live samples until cancelled or a fatal error occurs.
pub fn run<C: PacketChannel, K: Clock, S: SampleSink>(
    link: &mut Link<C, K>,
    session: &mut Session,
    config: &StationConfig,
    control: &mut Control,
    sink: &mut S,
) -> Result<()> {
    session.set_state(SessionState::Streaming);
    info!(history_limit = config.history_limit, "Live streaming started");

    let mut sync_pending = false;

    loop {
        if control.is_cancelled() {
            info!("Live streaming cancelled");
            session.set_state(SessionState::Ready);
            return Ok(());
        }
        control.serve_status(session);

        if sync_pending {
            sync_pending = false;
            let options = SyncOptions {
                since: session.last_history_timestamp(),
                erase: true,
                log_records: config.debug.log_history,
            };
            history::synchronize(link, session, options, control, sink)?;
            continue;
        }

        if let Some(raw) = link.read()? {
            match handle_report(session, config, &raw) {
                Ok(Handled::Sample(sample)) => {
                    if !sink.accept(sample) {
                        debug!("Sample consumer gone, stopping");
                        return Err(StationError::Shutdown);
                    }
                }
                Ok(Handled::SyncDue) => sync_pending = true,
                Ok(Handled::Nothing) => {}
                Err(e) => {
                    warn!(error = %e, "Dropping frame");
                    session.frame_dropped();
                }
            }
        }

        session.heartbeat_if_due(link)?;
    }
}

enum Handled {
    Sample(crate::types::Sample),
    SyncDue,
    Nothing,
}

fn handle_report(
    session: &mut Session,
    config: &StationConfig,
    raw: &[u8],
) -> Result<Handled, crate::error::DecodeError> {
    let bytes = match codec::classify(raw)? {
        Packet::Frame(bytes) => bytes,
        Packet::HistoryHead(_) | Packet::HistoryTail(_) => {
            trace!("Ignoring history fragment outside a sync pass");
            return Ok(Handled::Nothing);
        }
    };

    let frame = codec::decode(bytes)?;
    match frame {
        Frame::StationInfo(info) => {
            session.observe_station_info(&info);
            let occupancy = session.occupancy();
            if occupancy > f64::from(config.history_limit) {
                info!(
                    occupancy = format_args!("{occupancy:.1}"),
                    history_limit = config.history_limit,
                    "History ring above watermark, scheduling erase sync"
                );
                return Ok(Handled::SyncDue);
            }
            Ok(Handled::Nothing)
        }
        Frame::Ack(ack) => {
            trace!(command = ack.command, "Unsolicited ACK");
            Ok(Handled::Nothing)
        }
        sensor => match reading_from_frame(&sensor) {
            Some(reading) => {
                Ok(Handled::Sample(session.make_sample(reading, Provenance::Live, None)))
            }
            None => {
                debug!(tag = sensor.tag(), "Frame carried no usable reading");
                Ok(Handled::Nothing)
            }
        },
    }
}
