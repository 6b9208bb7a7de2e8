use std::sync::Arc;

use model::{point::Point, position::Position, route::Route, segment::Segment};
use tokio::sync::{mpsc, oneshot, watch};
use utility::id::Id;

use crate::{
    geofence::Geofence, machine::PointExecution, ExecutionConfig, ExecutionResult,
    RouteExecution,
};

type Responder<T> = oneshot::Sender<ExecutionResult<T>>;

#[derive(Debug)]
pub enum Request {
    Start {
        segment: Id<Segment>,
        responder: Responder<Segment>,
    },
    Resume {
        segment: Id<Segment>,
        responder: Responder<Segment>,
    },
    Finish {
        segment: Id<Segment>,
        justification: Option<String>,
        responder: Responder<Segment>,
    },
    MarkExecuted {
        segment: Id<Segment>,
        point: Id<Point>,
        manual: bool,
        responder: Responder<PointExecution>,
    },
    ApplyPosition {
        position: Position,
        geofence: Geofence,
        responder: oneshot::Sender<Vec<PointExecution>>,
    },
    Load {
        route: Box<Route>,
        responder: Responder<()>,
    },
}

/// Handle to the task owning the [`RouteExecution`]. Requests are processed
/// one at a time, so concurrent callers always observe serialized
/// transitions. Every successful mutation publishes a fresh snapshot.
#[derive(Debug, Clone)]
pub struct RouteStore {
    requests: mpsc::Sender<Request>,
    snapshots: watch::Receiver<Arc<Route>>,
    config: ExecutionConfig,
}

/// Applies `request` and answers it. A successful mutation is published
/// before the reply, so a caller that got its answer reads the new state.
fn handle(
    execution: &mut RouteExecution,
    publisher: &watch::Sender<Arc<Route>>,
    request: Request,
) {
    fn reply<T>(responder: oneshot::Sender<T>, value: T) {
        if responder.send(value).is_err() {
            log::debug!("requester went away before the reply");
        }
    }

    fn publish(publisher: &watch::Sender<Arc<Route>>, execution: &RouteExecution, changed: bool) {
        if changed {
            publisher.send_replace(Arc::new(execution.route().clone()));
        }
    }

    match request {
        Request::Start { segment, responder } => {
            let result = execution.start(&segment).cloned();
            publish(publisher, execution, result.is_ok());
            reply(responder, result);
        }
        Request::Resume { segment, responder } => {
            let result = execution.resume(&segment).cloned();
            publish(publisher, execution, result.is_ok());
            reply(responder, result);
        }
        Request::Finish {
            segment,
            justification,
            responder,
        } => {
            let result = execution
                .finish(&segment, justification.as_deref())
                .cloned();
            publish(publisher, execution, result.is_ok());
            reply(responder, result);
        }
        Request::MarkExecuted {
            segment,
            point,
            manual,
            responder,
        } => {
            let result = if manual {
                execution.mark_executed_manually(&segment, &point)
            } else {
                execution.mark_executed(&segment, &point)
            };
            publish(
                publisher,
                execution,
                matches!(&result, Ok(execution) if execution.newly_executed),
            );
            reply(responder, result);
        }
        Request::ApplyPosition {
            position,
            geofence,
            responder,
        } => {
            let executions = execution.apply_position(&position, &geofence);
            publish(
                publisher,
                execution,
                executions.iter().any(|execution| execution.newly_executed),
            );
            reply(responder, executions);
        }
        Request::Load { route, responder } => {
            let result = execution.load(*route);
            publish(publisher, execution, result.is_ok());
            reply(responder, result);
        }
    }
}

impl RouteStore {
    pub fn spawn(mut execution: RouteExecution) -> Self {
        let (requests, mut rx) = mpsc::channel(32);
        let (publisher, snapshots) = watch::channel(Arc::new(execution.route().clone()));
        let config = *execution.config();

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                handle(&mut execution, &publisher, request);
            }
            log::debug!("route store stopped");
        });

        Self {
            requests,
            snapshots,
            config,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Latest published state of the route.
    pub fn snapshot(&self) -> Arc<Route> {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified whenever the route changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Route>> {
        self.snapshots.clone()
    }

    pub fn active_segment(&self) -> Option<Segment> {
        self.snapshots.borrow().active_segment().cloned()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> ExecutionResult<T> {
        let (responder, receiver) = oneshot::channel();
        self.requests.send(build(responder)).await?;
        Ok(receiver.await?)
    }

    pub async fn start(&self, segment: &Id<Segment>) -> ExecutionResult<Segment> {
        self.request(|responder| Request::Start {
            segment: segment.clone(),
            responder,
        })
        .await?
    }

    pub async fn resume(&self, segment: &Id<Segment>) -> ExecutionResult<Segment> {
        self.request(|responder| Request::Resume {
            segment: segment.clone(),
            responder,
        })
        .await?
    }

    pub async fn finish(
        &self,
        segment: &Id<Segment>,
        justification: Option<String>,
    ) -> ExecutionResult<Segment> {
        self.request(|responder| Request::Finish {
            segment: segment.clone(),
            justification,
            responder,
        })
        .await?
    }

    pub async fn mark_executed(
        &self,
        segment: &Id<Segment>,
        point: &Id<Point>,
    ) -> ExecutionResult<PointExecution> {
        self.request(|responder| Request::MarkExecuted {
            segment: segment.clone(),
            point: point.clone(),
            manual: false,
            responder,
        })
        .await?
    }

    pub async fn mark_executed_manually(
        &self,
        segment: &Id<Segment>,
        point: &Id<Point>,
    ) -> ExecutionResult<PointExecution> {
        self.request(|responder| Request::MarkExecuted {
            segment: segment.clone(),
            point: point.clone(),
            manual: true,
            responder,
        })
        .await?
    }

    /// Evaluates `position` against the active segment and executes every
    /// point whose zone it is in.
    pub async fn apply_position(
        &self,
        position: Position,
        geofence: Geofence,
    ) -> ExecutionResult<Vec<PointExecution>> {
        self.request(|responder| Request::ApplyPosition {
            position,
            geofence,
            responder,
        })
        .await
    }

    pub async fn load(&self, route: Route) -> ExecutionResult<()> {
        self.request(|responder| Request::Load {
            route: Box::new(route),
            responder,
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use model::{segment::SegmentStatus, ExampleData};

    use super::*;
    use crate::ExecutionError;

    fn store() -> RouteStore {
        let execution =
            RouteExecution::new(Route::example_data(), ExecutionConfig::default()).unwrap();
        RouteStore::spawn(execution)
    }

    #[tokio::test]
    async fn mutations_publish_snapshots() {
        let store = store();
        let mut updates = store.subscribe();
        let seg1 = Id::from("seg1");

        store.start(&seg1).await.unwrap();
        updates.changed().await.unwrap();
        assert_eq!(
            updates.borrow_and_update().segment(&seg1).unwrap().status,
            SegmentStatus::Started
        );
        assert_eq!(store.active_segment().map(|segment| segment.id), Some(seg1));
    }

    #[tokio::test]
    async fn failed_requests_leave_the_snapshot_alone() {
        let store = store();
        let before = store.snapshot();
        let error = store.finish(&Id::from("seg1"), None).await.unwrap_err();
        assert!(matches!(error, ExecutionError::InvalidTransition { .. }));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[tokio::test]
    async fn concurrent_starts_admit_exactly_one() {
        let store = store();
        let (seg1, seg2, seg3) = (Id::from("seg1"), Id::from("seg2"), Id::from("seg3"));
        let (first, second, third) = tokio::join!(
            store.start(&seg1),
            store.start(&seg2),
            store.start(&seg3),
        );
        let results = [first, second, third];
        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|result| matches!(result, Err(error) if error.is_conflict()))
                .count(),
            2
        );
        assert_eq!(store.snapshot().started_segments().count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn replies_follow_the_published_snapshot() {
        let store = store();
        let seg1: Id<Segment> = Id::from("seg1");
        for _ in 0..500 {
            store.start(&seg1).await.unwrap();
            assert_eq!(
                store.snapshot().segment(&seg1).unwrap().status,
                SegmentStatus::Started
            );
            assert_eq!(store.active_segment().map(|segment| segment.id), Some(seg1.clone()));

            store.load(Route::example_data()).await.unwrap();
            assert_eq!(store.snapshot().started_segments().count(), 0);
        }
    }

    #[tokio::test]
    async fn positions_complete_the_active_segment() {
        let store = store();
        let seg1 = Id::from("seg1");
        store.start(&seg1).await.unwrap();

        let point = store.snapshot().segment(&seg1).unwrap().points[0].clone();
        let executions = store
            .apply_position(
                Position::new(point.latitude, point.longitude),
                Geofence::default(),
            )
            .await
            .unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].segment_status, SegmentStatus::Completed);

        let snapshot = store.snapshot();
        let segment = snapshot.segment(&seg1).unwrap();
        assert_eq!(segment.status, SegmentStatus::Completed);
        assert!(segment.points[0].executed_at.is_some());
        assert!(store.active_segment().is_none());
    }

    #[tokio::test]
    async fn load_resets_the_route() {
        let store = store();
        let seg1 = Id::from("seg1");
        store.start(&seg1).await.unwrap();
        store
            .mark_executed(&seg1, &Id::from("p1-1"))
            .await
            .unwrap();
        assert_eq!(store.snapshot().executed_points(), 1);

        store.load(Route::example_data()).await.unwrap();
        assert_eq!(store.snapshot().executed_points(), 0);
        assert!(store.active_segment().is_none());
    }
}
