//! Stateful derived values carried across samples.
//!
//! [`RainState`] turns the station's cumulative rain counter into per-sample
//! deltas. [`PressureCache`] fills in the last known pressure readings on samples
//! that lack them.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::decoder::readings::{ALTITUDE, BAROMETER, PRESSURE, RAIN, RAIN_TOTAL};

/// Largest value the cumulative rain counter can hold, in mm.
pub const RAIN_COUNTER_MAX: f64 = 6553.5;

/// Counter level at which the console should be cleared by an operator.
pub const RAIN_COUNTER_WARN: f64 = RAIN_COUNTER_MAX - 25.6;

const PRESSURE_FIELDS: [&str; 3] = [PRESSURE, BAROMETER, ALTITUDE];

/// Tracks the last cumulative rain counter value.
#[derive(Debug, Clone, Default)]
pub struct RainState {
    last_total: Option<f64>,
}

impl RainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_total(&self) -> Option<f64> {
        self.last_total
    }

    /// Rain since the previous counter value.
    ///
    /// Absent when either value is absent, or when the counter went backwards
    /// (reset or decrement). Never negative.
    pub fn delta(&mut self, new_total: Option<f64>) -> Option<f64> {
        let Some(new) = new_total else {
            return None;
        };
        if new >= RAIN_COUNTER_WARN {
            warn!(total = new, max = RAIN_COUNTER_MAX, "Rain counter close to overflow; clear it on the console");
        }

        let previous = self.last_total.replace(new)?;
        if new < previous {
            debug!(previous, new, "Rain counter reset detected");
            return None;
        }
        // Counter resolution is 0.1 mm.
        Some(((new - previous) * 10.0).round() / 10.0)
    }
}

/// Last known pressure-related fields.
#[derive(Debug, Clone, Default)]
pub struct PressureCache {
    cached: BTreeMap<&'static str, f64>,
}

impl PressureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cached.is_empty()
    }

    /// Cache pressure fields present in `fields`, or merge the cache into `fields`
    /// when it carries none.
    pub fn apply(&mut self, fields: &mut BTreeMap<String, Option<f64>>) {
        let mut carried = false;
        for name in PRESSURE_FIELDS {
            if let Some(Some(value)) = fields.get(name) {
                self.cached.insert(name, *value);
                carried = true;
            }
        }
        if carried {
            return;
        }
        for (name, value) in &self.cached {
            fields.insert((*name).to_string(), Some(*value));
        }
    }
}

/// Rain and pressure state applied to every sample before emission.
#[derive(Debug, Clone, Default)]
pub struct DerivedState {
    pub rain: RainState,
    pub pressure: PressureCache,
}

impl DerivedState {
    /// Add the `rain` delta and merge cached pressure into internal-name fields.
    pub fn apply(&mut self, fields: &mut BTreeMap<String, Option<f64>>) {
        if let Some(total) = fields.get(RAIN_TOTAL).copied() {
            let delta = self.rain.delta(total);
            fields.insert(RAIN.to_string(), delta);
        }
        self.pressure.apply(fields);
    }
}
