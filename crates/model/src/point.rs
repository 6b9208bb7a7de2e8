use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::{
    geo,
    id::{HasId, Id},
};

use crate::{position::Position, ExampleData};

/// A delivery or collection stop inside a segment.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub id: Id<Point>,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    #[serde(default)]
    pub executed: bool,
    pub executed_at: Option<DateTime<Utc>>,
}

impl HasId for Point {
    type IdType = String;
}

impl Point {
    pub fn new<I, A>(id: I, latitude: f64, longitude: f64, address: A) -> Self
    where
        I: Into<String>,
        A: Into<String>,
    {
        Self {
            id: Id::new(id.into()),
            latitude,
            longitude,
            address: address.into(),
            executed: false,
            executed_at: None,
        }
    }

    pub fn distance_m_to(&self, position: &Position) -> f64 {
        geo::haversine_distance_m(
            position.latitude,
            position.longitude,
            self.latitude,
            self.longitude,
        )
    }

    /// Degrees clockwise from north, as seen from `position`.
    pub fn bearing_from(&self, position: &Position) -> f64 {
        geo::bearing(
            position.latitude,
            position.longitude,
            self.latitude,
            self.longitude,
        )
    }

    /// Flips the executed flag. Returns `false` if the point was already
    /// executed, in which case nothing changes.
    pub fn execute(&mut self, at: DateTime<Utc>) -> bool {
        if self.executed {
            return false;
        }
        self.executed = true;
        self.executed_at = Some(at);
        true
    }
}

impl ExampleData for Point {
    fn example_data() -> Self {
        Point::new(
            "p1-1",
            -23.563744931352137,
            -46.67116887504856,
            "Rua Cardeal Arcoverde, 2365",
        )
    }
}
