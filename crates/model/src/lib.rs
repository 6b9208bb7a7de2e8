use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
pub use serde_with;

pub mod point;
pub mod position;
pub mod profile;
pub mod route;
pub mod segment;

pub trait ExampleData {
    fn example_data() -> Self;
}

/// Share of executed points, in percent. A collection without points counts
/// as not started.
pub fn progress_percent(executed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        executed as f64 * 100.0 / total as f64
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub executed_points: usize,
    pub total_points: usize,
    pub percent: f64,
}

impl Progress {
    pub fn new(executed_points: usize, total_points: usize) -> Self {
        Self {
            executed_points,
            total_points,
            percent: progress_percent(executed_points, total_points),
        }
    }
}
