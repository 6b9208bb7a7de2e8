use std::collections::HashSet;

use model::{point::Point, position::Position};
use utility::id::Id;

pub const DEFAULT_GEOFENCE_RADIUS_M: f64 = 15.0;

/// Circular arrival zone around each point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    radius_m: f64,
}

impl Default for Geofence {
    fn default() -> Self {
        Self::new(DEFAULT_GEOFENCE_RADIUS_M)
    }
}

impl Geofence {
    pub fn new(radius_m: f64) -> Self {
        Self { radius_m }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    fn is_active(&self) -> bool {
        self.radius_m.is_finite() && self.radius_m > 0.0
    }

    pub fn contains(&self, point: &Point, position: &Position) -> bool {
        self.is_active() && point.distance_m_to(position) <= self.radius_m
    }

    /// Ids of the points whose zone contains `position`, in point order.
    /// Points listed in `executed` or already flagged executed are skipped.
    pub fn evaluate<'a, I>(
        &self,
        position: &Position,
        points: I,
        executed: &HashSet<Id<Point>>,
    ) -> Vec<Id<Point>>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        if !self.is_active() {
            return vec![];
        }
        points
            .into_iter()
            .filter(|point| !point.executed && !executed.contains(&point.id))
            .filter(|point| self.contains(point, position))
            .map(|point| point.id.clone())
            .collect()
    }
}
