//! Protocol engine for USB weather-station data loggers.
//!
//! wxlink speaks the logger's 64-byte report protocol: it performs the identify
//! handshake, keeps the link alive with heartbeats, replays the on-device history
//! ring and streams live sensor frames as normalized [`Sample`]s.
//!
//! # Features
//!
//! - **Live streaming**: climate, wind, rain and pressure frames decoded as they arrive
//! - **History replay**: resumable catch-up from the logger's ring buffer, with
//!   automatic erase-mode passes when the ring fills past a watermark
//! - **Async surface**: one engine thread per station behind a `Stream` of samples
//! - **Pluggable transport**: anything implementing [`transport::PacketChannel`];
//!   real hardware via the `hid` feature
//!
//! ## Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use wxlink::{StationConfig, Wxlink};
//!
//! #[tokio::main]
//! async fn main() -> wxlink::Result<()> {
//!     let mut connection = Wxlink::connect(StationConfig::default(), None)?;
//!     let mut samples = connection.samples().expect("stream taken once");
//!
//!     while let Some(sample) = samples.next().await {
//!         let sample = sample?;
//!         println!("{:?} {:?}", sample.timestamp, sample.fields);
//!     }
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod codec;
pub mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Protocol engine
pub mod decoder;
pub mod history;
pub mod live;
pub mod protocol;
pub mod session;
pub mod state;
pub mod station;

// Async surface
pub mod connection;
pub mod driver;
pub mod transport;

pub use config::{DebugOptions, DeviceSelector, StationConfig};
pub use connection::{SampleStream, StationConnection};
pub use decoder::SensorMap;
pub use error::*;
pub use station::Station;
pub use types::*;

use jiff::civil::DateTime;

/// Entry point for connecting to a physical logger.
pub struct Wxlink;

impl Wxlink {
    /// Open the USB logger named by `config.device` and start its engine.
    ///
    /// History stamped after `resume_since` is replayed before live streaming.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the device cannot be
    /// opened, or the crate was built without the `hid` feature.
    #[cfg(feature = "hid")]
    pub fn connect(config: StationConfig, resume_since: Option<DateTime>) -> Result<StationConnection> {
        let config = config.validated()?;
        let channel = transport::HidChannel::open(&config.device)?;
        Ok(StationConnection::start(channel, config, resume_since))
    }

    #[cfg(not(feature = "hid"))]
    pub fn connect(config: StationConfig, resume_since: Option<DateTime>) -> Result<StationConnection> {
        let _ = (config, resume_since);
        Err(StationError::unsupported_transport("USB HID", "hid"))
    }

    /// Start an engine on a caller-supplied channel.
    pub fn attach<C>(
        channel: C,
        config: StationConfig,
        resume_since: Option<DateTime>,
    ) -> Result<StationConnection>
    where
        C: transport::PacketChannel + 'static,
    {
        let config = config.validated()?;
        Ok(StationConnection::start(channel, config, resume_since))
    }
}
