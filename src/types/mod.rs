//! Core types handed from the engine to the rest of the application.
//!
//! - [`Sample`] is one decoded observation with its provenance and, for history
//!   replay, the interval it covers.
//! - [`StationStatus`] is a point-in-time snapshot of the session served through
//!   the status request queue.
//!
//! ```rust
//! use wxlink::types::{Provenance, Sample, UnitSystem};
//! use std::collections::BTreeMap;
//!
//! let sample = Sample {
//!     timestamp: None,
//!     units: UnitSystem::Metric,
//!     provenance: Provenance::Live,
//!     interval: None,
//!     fields: BTreeMap::from([("outTemp".to_string(), Some(21.7))]),
//! };
//! assert_eq!(sample.value("outTemp"), Some(21.7));
//! assert!(!sample.is_historical());
//! ```

mod sample;
mod status;

pub use sample::{Provenance, Sample, UnitSystem};
pub use status::{SessionState, StationStatus};
