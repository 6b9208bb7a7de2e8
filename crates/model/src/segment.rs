use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::{HasId, Id};

use crate::{point::Point, position::Position, ExampleData, Progress};

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    #[default]
    #[serde(alias = "pendente")]
    Pending,
    #[serde(alias = "iniciado")]
    Started,
    Completed,
    #[serde(alias = "incompleto")]
    Incomplete,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An independently startable part of a route. Point order is the display
/// and navigation order, it is not enforced during execution.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: Id<Segment>,
    pub points: Vec<Point>,
    #[serde(default)]
    pub status: SegmentStatus,
    /// informational, in kilometers
    pub distance: f64,
    /// reason given when the segment was closed with unexecuted points
    pub justification: Option<String>,
}

impl HasId for Segment {
    type IdType = String;
}

impl Segment {
    pub fn new<I: Into<String>>(id: I, distance: f64, points: Vec<Point>) -> Self {
        Self {
            id: Id::new(id.into()),
            points,
            status: SegmentStatus::Pending,
            distance,
            justification: None,
        }
    }

    pub fn point(&self, id: &Id<Point>) -> Option<&Point> {
        self.points.iter().find(|point| &point.id == id)
    }

    pub fn point_mut(&mut self, id: &Id<Point>) -> Option<&mut Point> {
        self.points.iter_mut().find(|point| &point.id == id)
    }

    pub fn is_started(&self) -> bool {
        self.status == SegmentStatus::Started
    }

    pub fn executed_count(&self) -> usize {
        self.points.iter().filter(|point| point.executed).count()
    }

    pub fn unexecuted_count(&self) -> usize {
        self.points.len() - self.executed_count()
    }

    pub fn all_executed(&self) -> bool {
        self.points.iter().all(|point| point.executed)
    }

    pub fn unexecuted_points(&self) -> impl Iterator<Item = &Point> {
        self.points.iter().filter(|point| !point.executed)
    }

    pub fn progress(&self) -> Progress {
        Progress::new(self.executed_count(), self.points.len())
    }
}

/// Navigation hint towards the closest unexecuted point.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NextPoint {
    pub id: Id<Point>,
    pub address: String,
    pub distance_m: f64,
    /// degrees clockwise from north
    pub bearing: f64,
}

impl Segment {
    /// The unexecuted point closest to `position`, `None` once all points
    /// are executed.
    pub fn next_point(&self, position: &Position) -> Option<NextPoint> {
        self.unexecuted_points()
            .map(|point| (point, point.distance_m_to(position)))
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(point, distance_m)| NextPoint {
                id: point.id.clone(),
                address: point.address.clone(),
                distance_m,
                bearing: point.bearing_from(position),
            })
    }
}

impl ExampleData for Segment {
    fn example_data() -> Self {
        Segment::new("seg1", 12.5, vec![Point::example_data()])
    }
}
