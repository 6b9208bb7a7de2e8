use async_trait::async_trait;
use location::PositionSink;
use model::position::Position;
use tokio::sync::watch;

use crate::{geofence::Geofence, store::RouteStore};

/// Feeds tracked positions into the route store. Geofence evaluation and
/// point execution run inside the store, so an arrival is applied in one
/// step with the segment completion it may cause.
pub struct RouteSession {
    store: RouteStore,
    geofence: Geofence,
    last_position: watch::Sender<Option<Position>>,
}

impl RouteSession {
    pub fn new(store: RouteStore) -> Self {
        let geofence = store.config().geofence();
        Self::with_geofence(store, geofence)
    }

    pub fn with_geofence(store: RouteStore, geofence: Geofence) -> Self {
        Self {
            store,
            geofence,
            last_position: watch::channel(None).0,
        }
    }

    pub fn store(&self) -> &RouteStore {
        &self.store
    }

    pub fn geofence(&self) -> Geofence {
        self.geofence
    }

    pub fn last_position(&self) -> Option<Position> {
        self.last_position.borrow().clone()
    }
}

#[async_trait]
impl PositionSink for RouteSession {
    async fn on_position(&self, position: Position) {
        self.last_position.send_replace(Some(position.clone()));
        match self.store.apply_position(position, self.geofence).await {
            Ok(executions) => {
                for execution in executions.iter().filter(|e| e.newly_executed) {
                    log::info!(
                        "arrived at point '{}' of segment '{}' ({})",
                        execution.point,
                        execution.segment,
                        execution.segment_status
                    );
                }
            }
            Err(why) => log::error!("could not apply position: {why}"),
        }
    }
}
