//! Internal-to-canonical field name mapping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maps internal channel-indexed names (`temperature_0`, `humidity_3`, ...) onto
/// caller-chosen canonical names.
///
/// An empty map is the identity mapping. A non-empty map is exhaustive: any field
/// it does not mention is dropped from emitted samples rather than defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorMap {
    entries: BTreeMap<String, String>,
}

impl SensorMap {
    /// Identity mapping: every internal name passes through unchanged.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Build a mapping from `(internal, canonical)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self { entries: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    pub fn is_identity(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical name for an internal field, or `None` if the field is dropped.
    pub fn canonical<'a>(&'a self, internal: &'a str) -> Option<&'a str> {
        if self.is_identity() {
            Some(internal)
        } else {
            self.entries.get(internal).map(String::as_str)
        }
    }

    /// Rename a field set, dropping unmapped fields.
    pub fn apply(&self, fields: BTreeMap<String, Option<f64>>) -> BTreeMap<String, Option<f64>> {
        if self.is_identity() {
            return fields;
        }
        fields
            .into_iter()
            .filter_map(|(name, value)| self.entries.get(&name).map(|canon| (canon.clone(), value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> BTreeMap<String, Option<f64>> {
        BTreeMap::from([
            ("temperature_0".to_string(), Some(21.7)),
            ("temperature_1".to_string(), Some(18.2)),
            ("humidity_0".to_string(), None),
        ])
    }

    #[test]
    fn identity_keeps_everything() {
        let map = SensorMap::identity();
        assert_eq!(map.apply(fields()), fields());
        assert_eq!(map.canonical("anything"), Some("anything"));
    }

    #[test]
    fn explicit_map_renames_and_drops() {
        let map = SensorMap::from_pairs([("temperature_0", "outTemp"), ("humidity_0", "outHumidity")]);
        let mapped = map.apply(fields());

        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped.get("outTemp"), Some(&Some(21.7)));
        // Absent values stay absent after renaming; they are not zero-filled.
        assert_eq!(mapped.get("outHumidity"), Some(&None));
        assert!(!mapped.contains_key("temperature_1"));
        assert_eq!(map.canonical("temperature_1"), None);
    }

    #[test]
    fn deserializes_from_plain_mapping() {
        let map: SensorMap =
            serde_yaml_ng::from_str("temperature_1: inTemp\nhumidity_1: inHumidity\n")
                .expect("valid mapping");
        assert_eq!(map.canonical("temperature_1"), Some("inTemp"));
        assert!(!map.is_identity());
    }
}
