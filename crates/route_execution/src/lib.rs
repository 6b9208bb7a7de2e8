use std::{env, error, fmt};

use model::{
    point::Point,
    segment::{Segment, SegmentStatus},
};
use tokio::sync::{mpsc, oneshot};
use utility::id::Id;

pub mod geofence;
pub mod machine;
pub mod session;
pub mod store;

pub use geofence::{Geofence, DEFAULT_GEOFENCE_RADIUS_M};
pub use machine::{PointExecution, RouteExecution};
pub use session::RouteSession;
pub use store::RouteStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionError {
    SegmentNotFound(Id<Segment>),
    PointNotFound {
        segment: Id<Segment>,
        point: Id<Point>,
    },
    /// Another segment is already started.
    Conflict {
        requested: Id<Segment>,
        active: Id<Segment>,
    },
    InvalidTransition {
        segment: Id<Segment>,
        from: SegmentStatus,
        to: SegmentStatus,
    },
    /// Points can only be executed while their segment is started.
    NotStarted {
        segment: Id<Segment>,
        status: SegmentStatus,
    },
    /// Closing a segment with unexecuted points needs a reason.
    JustificationRequired {
        segment: Id<Segment>,
        unexecuted: usize,
    },
    ManualExecutionDisabled,
    InvalidRoute(String),
    /// The store task is gone.
    StoreUnavailable,
}

impl ExecutionError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl error::Error for ExecutionError {}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SegmentNotFound(id) => write!(f, "Segment '{id}' does not exist."),
            Self::PointNotFound { segment, point } => {
                write!(f, "Point '{point}' does not exist in segment '{segment}'.")
            }
            Self::Conflict { requested, active } => write!(
                f,
                "Segment '{active}' is in progress. Finish it before starting '{requested}'."
            ),
            Self::InvalidTransition { segment, from, to } => {
                write!(f, "Segment '{segment}' can not go from {from} to {to}.")
            }
            Self::NotStarted { segment, status } => {
                write!(f, "Segment '{segment}' is {status}, not started.")
            }
            Self::JustificationRequired { segment, unexecuted } => write!(
                f,
                "Segment '{segment}' has {unexecuted} unexecuted points. Please give a justification."
            ),
            Self::ManualExecutionDisabled => {
                write!(f, "Points can only be executed on arrival.")
            }
            Self::InvalidRoute(why) => write!(f, "Invalid route: {why}"),
            Self::StoreUnavailable => write!(f, "Route store is not running."),
        }
    }
}

impl<T> From<mpsc::error::SendError<T>> for ExecutionError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Self::StoreUnavailable
    }
}

impl From<oneshot::error::RecvError> for ExecutionError {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self::StoreUnavailable
    }
}

pub type ExecutionResult<O> = Result<O, ExecutionError>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionConfig {
    /// meters
    pub geofence_radius: f64,
    pub allow_manual_execution: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            geofence_radius: DEFAULT_GEOFENCE_RADIUS_M,
            allow_manual_execution: false,
        }
    }
}

impl ExecutionConfig {
    /// Reads `GEOFENCE_RADIUS_M` and `ALLOW_MANUAL_EXECUTION`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let geofence_radius = env::var("GEOFENCE_RADIUS_M")
            .ok()
            .and_then(|value| match value.parse::<f64>() {
                Ok(radius) => Some(radius),
                Err(_) => {
                    log::warn!("ignoring invalid GEOFENCE_RADIUS_M '{value}'");
                    None
                }
            })
            .unwrap_or(defaults.geofence_radius);
        let allow_manual_execution = env::var("ALLOW_MANUAL_EXECUTION")
            .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.allow_manual_execution);
        Self {
            geofence_radius,
            allow_manual_execution,
        }
    }

    pub fn geofence(&self) -> Geofence {
        Geofence::new(self.geofence_radius)
    }
}
