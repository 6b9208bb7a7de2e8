use std::collections::HashSet;

use chrono::Utc;
use model::{
    point::Point,
    position::Position,
    route::Route,
    segment::{Segment, SegmentStatus},
};
use schemars::JsonSchema;
use serde::Serialize;
use utility::id::Id;

use crate::{geofence::Geofence, ExecutionConfig, ExecutionError, ExecutionResult};

/// Result of executing one point.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PointExecution {
    pub segment: Id<Segment>,
    pub point: Id<Point>,
    /// `false` if the point had been executed before
    pub newly_executed: bool,
    /// segment status after the execution
    pub segment_status: SegmentStatus,
}

/// Owner of the route tree and the only place where segment and point state
/// changes. Every operation validates first and mutates afterwards, so a
/// failed operation leaves the route untouched.
#[derive(Debug, Clone)]
pub struct RouteExecution {
    route: Route,
    active_segment: Option<Id<Segment>>,
    config: ExecutionConfig,
}

fn validate(route: &Route) -> ExecutionResult<Option<Id<Segment>>> {
    let mut segment_ids = HashSet::new();
    for segment in &route.segments {
        if !segment_ids.insert(&segment.id) {
            return Err(ExecutionError::InvalidRoute(format!(
                "duplicate segment id '{}'",
                segment.id
            )));
        }
        let mut point_ids = HashSet::new();
        for point in &segment.points {
            if !point_ids.insert(&point.id) {
                return Err(ExecutionError::InvalidRoute(format!(
                    "duplicate point id '{}' in segment '{}'",
                    point.id, segment.id
                )));
            }
        }
        if segment.status == SegmentStatus::Completed && !segment.all_executed() {
            return Err(ExecutionError::InvalidRoute(format!(
                "segment '{}' is completed but has unexecuted points",
                segment.id
            )));
        }
    }

    let mut started = route.started_segments();
    let active = started.next().map(|segment| segment.id.clone());
    if let Some(other) = started.next() {
        return Err(ExecutionError::InvalidRoute(format!(
            "segments '{}' and '{}' are both started",
            active.map(|id| id.raw()).unwrap_or_default(),
            other.id
        )));
    }
    Ok(active)
}

impl RouteExecution {
    pub fn new(route: Route, config: ExecutionConfig) -> ExecutionResult<Self> {
        let active_segment = validate(&route)?;
        Ok(Self {
            route,
            active_segment,
            config,
        })
    }

    /// Replaces the whole route, e.g. on new-route assignment. This is the
    /// only way executed points become unexecuted again.
    pub fn load(&mut self, route: Route) -> ExecutionResult<()> {
        let active_segment = validate(&route)?;
        log::info!("loaded route '{}' ({})", route.name, route.id);
        self.route = route;
        self.active_segment = active_segment;
        Ok(())
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn active_segment(&self) -> Option<&Id<Segment>> {
        self.active_segment.as_ref()
    }

    fn segment(&self, id: &Id<Segment>) -> ExecutionResult<&Segment> {
        self.route
            .segment(id)
            .ok_or_else(|| ExecutionError::SegmentNotFound(id.clone()))
    }

    fn segment_mut(&mut self, id: &Id<Segment>) -> ExecutionResult<&mut Segment> {
        self.route
            .segment_mut(id)
            .ok_or_else(|| ExecutionError::SegmentNotFound(id.clone()))
    }

    fn ensure_no_other_active(&self, requested: &Id<Segment>) -> ExecutionResult<()> {
        match self
            .route
            .started_segments()
            .find(|segment| &segment.id != requested)
        {
            Some(active) => Err(ExecutionError::Conflict {
                requested: requested.clone(),
                active: active.id.clone(),
            }),
            None => Ok(()),
        }
    }

    fn enter_started(
        &mut self,
        id: &Id<Segment>,
        expected: SegmentStatus,
    ) -> ExecutionResult<&Segment> {
        let status = self.segment(id)?.status;
        if status != expected {
            return Err(ExecutionError::InvalidTransition {
                segment: id.clone(),
                from: status,
                to: SegmentStatus::Started,
            });
        }
        self.ensure_no_other_active(id)?;

        self.segment_mut(id)?.status = SegmentStatus::Started;
        self.active_segment = Some(id.clone());
        log::info!("segment '{id}' started (was {expected})");
        self.segment(id)
    }

    /// `pending → started`, refused while another segment is started.
    pub fn start(&mut self, id: &Id<Segment>) -> ExecutionResult<&Segment> {
        self.enter_started(id, SegmentStatus::Pending)
    }

    /// `incomplete → started`, under the same single-active rule as `start`.
    pub fn resume(&mut self, id: &Id<Segment>) -> ExecutionResult<&Segment> {
        self.enter_started(id, SegmentStatus::Incomplete)
    }

    /// Marks a point of the started segment as executed. Executing the last
    /// open point completes the segment and clears the active marker within
    /// the same call.
    pub fn mark_executed(
        &mut self,
        segment_id: &Id<Segment>,
        point_id: &Id<Point>,
    ) -> ExecutionResult<PointExecution> {
        let segment = self.segment(segment_id)?;
        if segment.status != SegmentStatus::Started {
            return Err(ExecutionError::NotStarted {
                segment: segment_id.clone(),
                status: segment.status,
            });
        }
        if segment.point(point_id).is_none() {
            return Err(ExecutionError::PointNotFound {
                segment: segment_id.clone(),
                point: point_id.clone(),
            });
        }

        let segment = self.segment_mut(segment_id)?;
        let newly_executed = segment
            .point_mut(point_id)
            .map(|point| point.execute(Utc::now()))
            .unwrap_or(false);
        let completed = segment.all_executed();
        if completed {
            segment.status = SegmentStatus::Completed;
            segment.justification = None;
        }
        let segment_status = segment.status;

        if newly_executed {
            log::info!("point '{point_id}' of segment '{segment_id}' executed");
        }
        if completed {
            self.active_segment = None;
            log::info!("segment '{segment_id}' completed");
        }
        Ok(PointExecution {
            segment: segment_id.clone(),
            point: point_id.clone(),
            newly_executed,
            segment_status,
        })
    }

    /// Manual override for drivers that can not reach a point's geofence.
    pub fn mark_executed_manually(
        &mut self,
        segment_id: &Id<Segment>,
        point_id: &Id<Point>,
    ) -> ExecutionResult<PointExecution> {
        if !self.config.allow_manual_execution {
            return Err(ExecutionError::ManualExecutionDisabled);
        }
        log::info!("manual execution of point '{point_id}' in segment '{segment_id}'");
        self.mark_executed(segment_id, point_id)
    }

    /// Closes the started segment. With every point executed the segment is
    /// completed; otherwise a non-blank justification is required and the
    /// segment becomes incomplete.
    pub fn finish(
        &mut self,
        id: &Id<Segment>,
        justification: Option<&str>,
    ) -> ExecutionResult<&Segment> {
        let segment = self.segment(id)?;
        if segment.status != SegmentStatus::Started {
            let to = if segment.all_executed() {
                SegmentStatus::Completed
            } else {
                SegmentStatus::Incomplete
            };
            return Err(ExecutionError::InvalidTransition {
                segment: id.clone(),
                from: segment.status,
                to,
            });
        }

        let (status, justification) = if segment.all_executed() {
            (SegmentStatus::Completed, None)
        } else {
            match justification.map(str::trim).filter(|text| !text.is_empty()) {
                Some(text) => (SegmentStatus::Incomplete, Some(text.to_owned())),
                None => {
                    return Err(ExecutionError::JustificationRequired {
                        segment: id.clone(),
                        unexecuted: segment.unexecuted_count(),
                    })
                }
            }
        };

        let segment = self.segment_mut(id)?;
        segment.status = status;
        segment.justification = justification;
        self.active_segment = None;
        log::info!("segment '{id}' finished as {status}");
        self.segment(id)
    }

    /// Runs the geofence for `position` against the started segment and
    /// executes every point it entered, in point order.
    pub fn apply_position(
        &mut self,
        position: &Position,
        geofence: &Geofence,
    ) -> Vec<PointExecution> {
        let Some(segment_id) = self.active_segment.clone() else {
            log::trace!("position ignored, no active segment");
            return vec![];
        };
        let entered = match self.segment(&segment_id) {
            Ok(segment) => geofence.evaluate(position, &segment.points, &HashSet::new()),
            Err(_) => return vec![],
        };

        let mut executions = Vec::with_capacity(entered.len());
        for point_id in entered {
            match self.mark_executed(&segment_id, &point_id) {
                Ok(execution) => executions.push(execution),
                Err(why) => log::warn!("geofence hit for '{point_id}' not applied: {why}"),
            }
        }
        executions
    }
}
