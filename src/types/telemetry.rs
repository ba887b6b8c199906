//! Decoded telemetry snapshots

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// One decoded telemetry datagram: metric name to numeric value.
///
/// Keys whose value does not parse as a number are omitted, never defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(transparent)]
pub struct TelemetryFrame {
    metrics: BTreeMap<String, f64>,
}

impl TelemetryFrame {
    /// Decode an ASCII `key:value;key:value;` datagram.
    ///
    /// Each pair is handled independently; a malformed pair is skipped and
    /// decoding continues with the rest of the datagram. Empty segments,
    /// a missing final `;` and trailing line endings are tolerated.
    pub fn decode(datagram: &[u8]) -> Self {
        let text = String::from_utf8_lossy(datagram);
        let mut metrics = BTreeMap::new();

        for segment in text.trim_end_matches(['\r', '\n', '\0']).split(';') {
            if segment.is_empty() {
                continue;
            }
            let Some((key, value)) = segment.split_once(':') else {
                trace!("Skipping telemetry segment without separator: {:?}", segment);
                continue;
            };
            if key.is_empty() {
                trace!("Skipping telemetry segment with empty key: {:?}", segment);
                continue;
            }
            match value.parse::<f64>() {
                Ok(number) if number.is_finite() => {
                    metrics.insert(key.to_string(), number);
                }
                _ => trace!("Skipping non-numeric telemetry value {}={:?}", key, value),
            }
        }

        Self { metrics }
    }

    /// Look up a metric by name.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.metrics.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Iterate metrics in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn into_inner(self) -> BTreeMap<String, f64> {
        self.metrics
    }

    /// Pitch in degrees.
    pub fn pitch(&self) -> Option<f64> {
        self.get("pitch")
    }

    /// Roll in degrees.
    pub fn roll(&self) -> Option<f64> {
        self.get("roll")
    }

    /// Yaw in degrees.
    pub fn yaw(&self) -> Option<f64> {
        self.get("yaw")
    }

    /// Velocity `(x, y, z)` in dm/s, present only when all three axes decoded.
    pub fn velocity(&self) -> Option<(f64, f64, f64)> {
        Some((self.get("vgx")?, self.get("vgy")?, self.get("vgz")?))
    }

    /// Acceleration `(x, y, z)` in 0.001g.
    pub fn acceleration(&self) -> Option<(f64, f64, f64)> {
        Some((self.get("agx")?, self.get("agy")?, self.get("agz")?))
    }

    /// Lowest and highest board temperature in °C.
    pub fn temperature_range(&self) -> Option<(f64, f64)> {
        Some((self.get("templ")?, self.get("temph")?))
    }

    /// Time-of-flight distance in cm.
    pub fn tof(&self) -> Option<f64> {
        self.get("tof")
    }

    /// Height in cm.
    pub fn height(&self) -> Option<f64> {
        self.get("h")
    }

    /// Battery percentage.
    pub fn battery(&self) -> Option<f64> {
        self.get("bat")
    }

    /// Barometer altitude in m.
    pub fn barometer(&self) -> Option<f64> {
        self.get("baro")
    }

    /// Motor-on time in s.
    pub fn flight_time(&self) -> Option<f64> {
        self.get("time")
    }
}

impl FromIterator<(String, f64)> for TelemetryFrame {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self { metrics: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn omits_non_numeric_values() {
        let frame = TelemetryFrame::decode(b"pitch:-7;roll:abc;bat:85;");
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.pitch(), Some(-7.0));
        assert_eq!(frame.battery(), Some(85.0));
        assert!(!frame.contains("roll"));
    }

    #[test]
    fn decodes_full_state_datagram() {
        let datagram = concat!(
            "pitch:0;roll:2;yaw:-45;vgx:0;vgy:0;vgz:0;templ:62;temph:65;tof:10;h:0;",
            "bat:87;baro:183.34;time:0;agx:-3.00;agy:-32.00;agz:-999.00;\r\n"
        )
        .as_bytes();
        let frame = TelemetryFrame::decode(datagram);

        assert_eq!(frame.len(), 16);
        assert_eq!(frame.yaw(), Some(-45.0));
        assert_eq!(frame.barometer(), Some(183.34));
        assert_eq!(frame.velocity(), Some((0.0, 0.0, 0.0)));
        assert_eq!(frame.acceleration(), Some((-3.0, -32.0, -999.0)));
        assert_eq!(frame.temperature_range(), Some((62.0, 65.0)));
    }

    #[test]
    fn tolerates_noise() {
        let frame = TelemetryFrame::decode(b";;h:30;:5;novalue;tof:;bat:50");
        assert_eq!(frame.height(), Some(30.0));
        assert_eq!(frame.battery(), Some(50.0));
        assert_eq!(frame.len(), 2);

        assert!(TelemetryFrame::decode(b"").is_empty());
        assert!(TelemetryFrame::decode(&[0xff, 0xfe, b';']).is_empty());
    }

    #[test]
    fn rejects_non_finite_numbers() {
        let frame = TelemetryFrame::decode(b"a:NaN;b:inf;c:1e3;");
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.get("c"), Some(1000.0));
    }

    proptest! {
        #[test]
        fn keeps_exactly_the_numeric_keys(
            pairs in prop::collection::btree_map(
                "[a-z]{1,6}",
                prop_oneof![
                    (-10_000i32..10_000i32).prop_map(|n| (n.to_string(), true)),
                    (-1000.0f64..1000.0f64).prop_map(|n| (format!("{n:.2}"), true)),
                    "[g-z]{1,4}".prop_map(|s| (s, false)),
                ],
                0..12,
            )
        ) {
            let datagram: String = pairs.iter().map(|(k, (v, _))| format!("{k}:{v};")).collect();
            let frame = TelemetryFrame::decode(datagram.as_bytes());

            let expected: Vec<&String> =
                pairs.iter().filter(|(_, (_, numeric))| *numeric).map(|(k, _)| k).collect();
            prop_assert_eq!(frame.len(), expected.len());
            for key in expected {
                let parsed: f64 = pairs[key].0.parse().unwrap();
                prop_assert_eq!(frame.get(key), Some(parsed));
            }
        }
    }
}
