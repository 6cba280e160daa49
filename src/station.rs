//! Protocol engine: handshake, initial history catch-up, then live streaming.

use jiff::civil::DateTime;
use tracing::{error, info};

use crate::clock::Clock;
use crate::history::{self, SyncOptions, SyncReport};
use crate::live::{self, Control};
use crate::session::{self, Link, SampleSink, Session};
use crate::transport::PacketChannel;
use crate::types::{SessionState, StationStatus};
use crate::{Result, StationConfig, StationError};

/// One connection to one logger.
///
/// Owns the transport for its whole life; everything runs on the calling thread.
pub struct Station<C: PacketChannel, K: Clock> {
    link: Link<C, K>,
    session: Session,
    config: StationConfig,
}

impl<C: PacketChannel, K: Clock> Station<C, K> {
    pub fn new(channel: C, clock: K, config: StationConfig) -> Self {
        let link = Link::new(channel, clock, &config);
        let session = Session::new(&config);
        Self { link, session, config }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn status(&self) -> StationStatus {
        self.session.status()
    }

    pub fn handshake(&mut self) -> Result<()> {
        session::handshake(&mut self.link, &mut self.session, self.config.handshake_attempts)
    }

    pub fn sync_history<S: SampleSink>(
        &mut self,
        options: SyncOptions,
        control: &mut Control,
        sink: &mut S,
    ) -> Result<SyncReport> {
        self.require_ready()?;
        history::synchronize(&mut self.link, &mut self.session, options, control, sink)
    }

    pub fn stream<S: SampleSink>(&mut self, control: &mut Control, sink: &mut S) -> Result<()> {
        self.require_ready()?;
        live::run(&mut self.link, &mut self.session, &self.config, control, sink)
    }

    fn require_ready(&self) -> Result<()> {
        match self.session.state() {
            SessionState::Ready | SessionState::Streaming => Ok(()),
            state => Err(StationError::NotReady { state }),
        }
    }

    /// Handshake, replay history newer than `resume_since`, then stream live.
    ///
    /// Returns `Ok` on cancellation. Fatal errors leave the session disconnected;
    /// build a new station to reconnect.
    pub fn run<S: SampleSink>(
        mut self,
        resume_since: Option<DateTime>,
        control: &mut Control,
        sink: &mut S,
    ) -> Result<()> {
        let result = self.run_inner(resume_since, control, sink);
        self.link.close();
        self.session.set_state(SessionState::Disconnected);
        match &result {
            Ok(()) => info!("Station session closed"),
            Err(StationError::Shutdown) => info!("Station session closed by consumer"),
            Err(e) => error!(error = %e, "Station session failed"),
        }
        result
    }

    fn run_inner<S: SampleSink>(
        &mut self,
        resume_since: Option<DateTime>,
        control: &mut Control,
        sink: &mut S,
    ) -> Result<()> {
        self.handshake()?;
        control.serve_status(&self.session);

        let options = SyncOptions {
            since: resume_since,
            erase: self.config.history_erase_on_read,
            log_records: self.config.debug.log_history,
        };
        self.sync_history(options, control, sink)?;

        self.stream(control, sink)
    }
}
