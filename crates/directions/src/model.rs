use model::position::Coordinates;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Body of a directions response. Only the fields in use are modeled.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectionsResponse {
    pub code: String,
    pub message: Option<String>,
    #[serde(default)]
    pub routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectionsRoute {
    pub geometry: LineString,
    /// meters
    #[serde(default)]
    pub distance: f64,
    /// seconds
    #[serde(default)]
    pub duration: f64,
}

/// GeoJSON `LineString`.
#[derive(Debug, Clone, Deserialize)]
pub struct LineString {
    pub coordinates: Vec<Coordinates>,
}

/// A drivable path through all requested stops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Polyline {
    pub coordinates: Vec<Coordinates>,
    /// meters
    pub distance: f64,
    /// seconds
    pub duration: f64,
}

impl Polyline {
    /// Appends the next leg. The joint vertex shared with the previous leg is
    /// kept once.
    pub fn extend(&mut self, leg: DirectionsRoute) {
        let mut coordinates = leg.geometry.coordinates.into_iter().peekable();
        if let (Some(last), Some(first)) = (self.coordinates.last(), coordinates.peek()) {
            if last == first {
                coordinates.next();
            }
        }
        self.coordinates.extend(coordinates);
        self.distance += leg.distance;
        self.duration += leg.duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{
        "code": "Ok",
        "routes": [{
            "geometry": {
                "type": "LineString",
                "coordinates": [[-46.6633, -23.5505], [-46.6640, -23.5512], [-46.6655, -23.5520]]
            },
            "legs": [],
            "distance": 412.3,
            "duration": 95.1,
            "weight": 120.0
        }],
        "waypoints": [],
        "uuid": "abc"
    }"#;

    #[test]
    fn parse_response() {
        let response: DirectionsResponse = serde_json::from_str(RESPONSE).unwrap();
        assert_eq!(response.code, "Ok");
        let route = &response.routes[0];
        assert_eq!(route.geometry.coordinates.len(), 3);
        assert_eq!(route.geometry.coordinates[0], Coordinates::new(-46.6633, -23.5505));
        assert_eq!(route.distance, 412.3);
    }

    #[test]
    fn parse_error_response() {
        let response: DirectionsResponse =
            serde_json::from_str(r#"{"code": "NoRoute", "message": "No route found"}"#).unwrap();
        assert!(response.routes.is_empty());
        assert_eq!(response.message.as_deref(), Some("No route found"));
    }

    #[test]
    fn legs_share_their_joint() {
        let leg = |points: &[(f64, f64)], distance: f64| DirectionsRoute {
            geometry: LineString {
                coordinates: points
                    .iter()
                    .map(|(lon, lat)| Coordinates::new(*lon, *lat))
                    .collect(),
            },
            distance,
            duration: distance / 10.0,
        };

        let mut polyline = Polyline::default();
        polyline.extend(leg(&[(1.0, 1.0), (2.0, 2.0)], 100.0));
        polyline.extend(leg(&[(2.0, 2.0), (3.0, 3.0)], 50.0));
        polyline.extend(leg(&[(3.5, 3.5), (4.0, 4.0)], 50.0));

        assert_eq!(
            polyline.coordinates,
            vec![
                Coordinates::new(1.0, 1.0),
                Coordinates::new(2.0, 2.0),
                Coordinates::new(3.0, 3.0),
                Coordinates::new(3.5, 3.5),
                Coordinates::new(4.0, 4.0),
            ]
        );
        assert_eq!(polyline.distance, 200.0);
        assert_eq!(polyline.duration, 20.0);
    }
}
