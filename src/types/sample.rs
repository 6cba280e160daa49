//! Decoded samples.

use jiff::civil::DateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unit system of every value in a sample.
///
/// The logger reports metric values only, so this is a fixed tag rather than a
/// conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum UnitSystem {
    /// °C, %, m/s, degrees, mm, mm/h, hPa, m.
    #[default]
    Metric,
}

/// Where a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    Historical,
}

/// One decoded observation.
///
/// Ownership moves to the consumer on hand-off; the engine keeps no reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Station-local wall time, or `None` when the station had no clock reading.
    pub timestamp: Option<DateTime>,
    pub units: UnitSystem,
    pub provenance: Provenance,
    /// Minutes since the previously emitted history record. Historical samples only.
    pub interval: Option<i64>,
    /// Canonical field name to value. `None` means "not available".
    pub fields: BTreeMap<String, Option<f64>>,
}

impl Sample {
    pub fn value(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied().flatten()
    }

    pub fn is_historical(&self) -> bool {
        self.provenance == Provenance::Historical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_snake_case_tags() {
        let sample = Sample {
            timestamp: DateTime::new(2024, 6, 1, 12, 30, 0, 0).ok(),
            units: UnitSystem::Metric,
            provenance: Provenance::Historical,
            interval: Some(5),
            fields: BTreeMap::from([("rain".to_string(), None)]),
        };
        let yaml = serde_yaml_ng::to_string(&sample).unwrap();
        assert!(yaml.contains("provenance: historical"));
        assert!(yaml.contains("units: metric"));
        assert!(yaml.contains("2024-06-01T12:30:00"));
        assert!(yaml.contains("rain: null"));

        let back: Sample = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn missing_and_absent_values_read_the_same() {
        let sample = Sample {
            timestamp: None,
            units: UnitSystem::default(),
            provenance: Provenance::Live,
            interval: None,
            fields: BTreeMap::from([("pressure".to_string(), None)]),
        };
        assert_eq!(sample.value("pressure"), None);
        assert_eq!(sample.value("barometer"), None);
        assert!(!sample.is_historical());
    }
}
