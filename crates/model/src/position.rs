use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A position fix delivered by the geolocation source.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// accuracy radius in meters, if reported
    pub accuracy: Option<f64>,
    pub heading: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            heading: None,
            timestamp: None,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.longitude, self.latitude)
    }
}

/// A `[longitude, latitude]` pair as used by routing services.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Coordinates(pub f64, pub f64);

impl Coordinates {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self(longitude, latitude)
    }

    pub fn longitude(&self) -> f64 {
        self.0
    }

    pub fn latitude(&self) -> f64 {
        self.1
    }

    /// Rejects out-of-range values and coordinates with a zero component,
    /// which in practice come from unset GPS fields.
    pub fn is_valid(&self) -> bool {
        let (lon, lat) = (self.0, self.1);
        lon.is_finite()
            && lat.is_finite()
            && lon.abs() <= 180.0
            && lat.abs() <= 90.0
            && lon != 0.0
            && lat != 0.0
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.0, self.1)
    }
}

impl From<&Position> for Coordinates {
    fn from(position: &Position) -> Self {
        position.coordinates()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_validation() {
        assert!(Coordinates::new(-46.67, -23.56).is_valid());
        assert!(Coordinates::new(180.0, 90.0).is_valid());
        assert!(!Coordinates::new(180.1, 10.0).is_valid());
        assert!(!Coordinates::new(10.0, -90.5).is_valid());
        assert!(!Coordinates::new(0.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, 12.0).is_valid());
        assert!(!Coordinates::new(f64::NAN, 12.0).is_valid());
    }

    #[test]
    fn coordinates_are_longitude_first() {
        let position = Position::new(-23.5, -46.6);
        let coordinates = position.coordinates();
        assert_eq!(coordinates.longitude(), -46.6);
        assert_eq!(coordinates.latitude(), -23.5);
        assert_eq!(coordinates.to_string(), "-46.6,-23.5");
        assert_eq!(serde_json::to_string(&coordinates).unwrap(), "[-46.6,-23.5]");
    }
}
