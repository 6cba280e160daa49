//! Driver spawns and manages the station engine task

use jiff::civil::DateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::live::{Control, StatusRequest};
use crate::station::Station;
use crate::transport::PacketChannel;
use crate::types::Sample;
use crate::{Result, StationConfig, StationError};

/// Result of spawning the engine task
pub struct DriverChannels {
    /// Decoded samples, followed by at most one terminal error
    pub samples: mpsc::UnboundedReceiver<Result<Sample>>,
    /// Status requests, answered by the engine between reads
    pub status: mpsc::UnboundedSender<StatusRequest>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    /// Handle of the blocking engine task
    pub task: JoinHandle<()>,
}

/// Driver spawns the station engine onto its own blocking task
///
/// The engine owns the transport for the life of the session. Everything else
/// talks to it through channels: samples flow out, status requests flow in.
pub struct Driver;

impl Driver {
    /// Spawn the engine for the given channel
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<C, K>(
        channel: C,
        clock: K,
        config: StationConfig,
        resume_since: Option<DateTime>,
    ) -> DriverChannels
    where
        C: PacketChannel + 'static,
        K: Clock + 'static,
    {
        let (sample_tx, sample_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let mut control = Control::new(cancel.clone(), status_rx);

        let task = tokio::task::spawn_blocking(move || {
            info!("Station engine task started");
            let station = Station::new(channel, clock, config);
            let mut sink = sample_tx.clone();

            match station.run(resume_since, &mut control, &mut sink) {
                Ok(()) => debug!("Station engine stopped"),
                Err(StationError::Shutdown) => debug!("Sample receiver dropped"),
                Err(e) => {
                    // Terminal error is the last item the consumer sees.
                    let _ = sample_tx.send(Err(e));
                }
            }
            info!("Station engine task ended");
        });

        DriverChannels { samples: sample_rx, status: status_tx, cancel, task }
    }
}
