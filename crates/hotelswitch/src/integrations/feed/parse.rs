//! GeoJSON feed parsing.
//!
//! The feed is a GeoJSON feature collection. Each location is a point feature:
//!
//! ```json
//! {
//!   "type": "Feature",
//!   "geometry": { "type": "Point", "coordinates": [5.72, 52.22] },
//!   "properties": { "name": "Hacker Hotel", "marker-symbol": "/hsmap/hs_open.png" }
//! }
//! ```

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::FeedError;
use crate::config::FeedConfig;
use crate::engine::SpaceState;

/// One location from the feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteSpace {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub state: SpaceState,
}

/// All locations from one fetch. Replaced wholesale on every refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub spaces: Vec<RemoteSpace>,
}

impl Snapshot {
    pub fn find(&self, name: &str) -> Option<&RemoteSpace> {
        self.spaces.iter().find(|space| space.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: Properties,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Properties {
    name: String,
    /// Anything that isn't one of the known marker strings means undetermined
    #[serde(rename = "marker-symbol", default)]
    marker_symbol: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// `[longitude, latitude]`, optionally followed by an altitude
    coordinates: Vec<f64>,
}

/// Turns feed payloads into snapshots
#[derive(Debug, Clone)]
pub struct FeedParser {
    local_name: String,
    local_latitude: f64,
    local_longitude: f64,
    open_marker: String,
    closed_marker: String,
}

impl FeedParser {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            local_name: config.local_name.clone(),
            local_latitude: config.local_latitude,
            local_longitude: config.local_longitude,
            open_marker: config.open_marker.clone(),
            closed_marker: config.closed_marker.clone(),
        }
    }

    /// Name of this installation's own location
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    fn marker_state(&self, marker: Option<&serde_json::Value>) -> SpaceState {
        match marker.and_then(|m| m.as_str()) {
            Some(m) if m == self.open_marker => SpaceState::Open,
            Some(m) if m == self.closed_marker => SpaceState::Closed,
            _ => SpaceState::Undetermined,
        }
    }

    /// Parse a feature collection
    ///
    /// Malformed features are skipped. The local location is always present
    /// in the result: if the feed doesn't list it, a fallback record with the
    /// configured coordinates is appended.
    pub fn parse(&self, payload: &serde_json::Value) -> Result<Snapshot, FeedError> {
        let features = payload
            .get("features")
            .and_then(|f| f.as_array())
            .ok_or_else(|| FeedError::Malformed("missing features array".to_string()))?;

        let mut spaces = Vec::with_capacity(features.len() + 1);
        for (index, value) in features.iter().enumerate() {
            let feature = match Feature::deserialize(value) {
                Ok(feature) => feature,
                Err(e) => {
                    warn!("Skipping malformed feature {}: {}", index, e);
                    continue;
                }
            };

            let (longitude, latitude) = match feature.geometry.coordinates[..] {
                [longitude, latitude, ..] => (longitude, latitude),
                _ => {
                    warn!("Skipping feature {}: position has fewer than two values", index);
                    continue;
                }
            };
            spaces.push(RemoteSpace {
                state: self.marker_state(feature.properties.marker_symbol.as_ref()),
                name: feature.properties.name,
                latitude,
                longitude,
            });
        }
        debug!("Parsed {} of {} features", spaces.len(), features.len());

        if !spaces.iter().any(|space| space.name == self.local_name) {
            info!("{} not found in feed; adding manually", self.local_name);
            spaces.push(RemoteSpace {
                name: self.local_name.clone(),
                latitude: self.local_latitude,
                longitude: self.local_longitude,
                state: SpaceState::Undetermined,
            });
        }

        Ok(Snapshot { spaces })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parser() -> FeedParser {
        FeedParser::new(&FeedConfig::default())
    }

    fn feature(name: &str, lon: f64, lat: f64, marker: serde_json::Value) -> serde_json::Value {
        json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [lon, lat] },
            "properties": { "name": name, "marker-symbol": marker }
        })
    }

    #[test]
    fn test_marker_symbols() {
        let payload = json!({
            "type": "FeatureCollection",
            "features": [
                feature("Open Space", 4.9, 52.37, json!("/hsmap/hs_open.png")),
                feature("Closed Space", 5.1, 52.09, json!("/hsmap/hs_closed.png")),
                feature("Odd Space", 6.5, 53.2, json!("/hsmap/hs_unknown.png")),
                feature("Numeric Space", 6.5, 53.2, json!(42)),
                feature("Hacker Hotel", 5.72, 52.22, json!("/hsmap/hs_open.png")),
            ]
        });

        let snapshot = parser().parse(&payload).unwrap();
        let states: Vec<_> = snapshot.spaces.iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                SpaceState::Open,
                SpaceState::Closed,
                SpaceState::Undetermined,
                SpaceState::Undetermined,
                SpaceState::Open,
            ]
        );
        // Coordinates are longitude first
        assert_eq!(snapshot.spaces[0].longitude, 4.9);
        assert_eq!(snapshot.spaces[0].latitude, 52.37);
    }

    #[test]
    fn test_position_with_altitude() {
        let payload = json!({
            "features": [
                {
                    "geometry": { "coordinates": [4.9, 52.37, 3.5] },
                    "properties": { "name": "High Space" }
                },
                {
                    "geometry": { "coordinates": [4.9] },
                    "properties": { "name": "Half Space" }
                },
            ]
        });

        let snapshot = parser().parse(&payload).unwrap();
        let high = snapshot.find("High Space").unwrap();
        assert_eq!(high.longitude, 4.9);
        assert_eq!(high.latitude, 52.37);
        assert!(snapshot.find("Half Space").is_none());
    }

    #[test]
    fn test_missing_marker_is_undetermined() {
        let payload = json!({
            "features": [{
                "geometry": { "coordinates": [4.9, 52.37] },
                "properties": { "name": "Quiet Space" }
            }]
        });

        let snapshot = parser().parse(&payload).unwrap();
        assert_eq!(snapshot.find("Quiet Space").unwrap().state, SpaceState::Undetermined);
    }

    #[test]
    fn test_fallback_for_local_location() {
        let payload = json!({
            "features": [feature("Open Space", 4.9, 52.37, json!("/hsmap/hs_open.png"))]
        });

        let snapshot = parser().parse(&payload).unwrap();
        assert_eq!(snapshot.spaces.len(), 2);
        assert_eq!(
            snapshot.spaces[1],
            RemoteSpace {
                name: "Hacker Hotel".to_string(),
                latitude: 52.2208671,
                longitude: 5.7208085,
                state: SpaceState::Undetermined,
            }
        );
    }

    #[test]
    fn test_malformed_features_are_skipped() {
        let payload = json!({
            "features": [
                { "properties": { "name": "No Geometry" } },
                { "geometry": { "coordinates": [1.0] }, "properties": { "name": "Short" } },
                { "geometry": { "coordinates": [1.0, 2.0] }, "properties": {} },
                "not even an object",
                feature("Good Space", 4.9, 52.37, json!("/hsmap/hs_closed.png")),
            ]
        });

        let snapshot = parser().parse(&payload).unwrap();
        let names: Vec<_> = snapshot.spaces.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Good Space", "Hacker Hotel"]);
    }

    #[test]
    fn test_payload_without_features_is_an_error() {
        assert!(parser().parse(&json!({ "error": "maintenance" })).is_err());
        assert!(parser().parse(&json!([])).is_err());
    }
}
