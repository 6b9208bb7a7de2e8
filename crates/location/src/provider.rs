use async_trait::async_trait;
use model::position::Position;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

use crate::{LocationError, PermissionState, PositionOptions};

pub type PositionEvent = Result<Position, LocationError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub u64);

/// A live position watch. Events arrive in the order the provider produced
/// them. Dropping the subscription does not clear the watch on the provider
/// side, use `LocationProvider::clear_watch` for that.
pub struct Subscription {
    id: WatchId,
    events: ReceiverStream<PositionEvent>,
}

impl Subscription {
    pub fn new(id: WatchId, events: mpsc::Receiver<PositionEvent>) -> Self {
        Self {
            id,
            events: ReceiverStream::new(events),
        }
    }

    pub fn id(&self) -> WatchId {
        self.id
    }

    /// Next event, or `None` once the provider closed the watch.
    pub async fn next(&mut self) -> Option<PositionEvent> {
        self.events.next().await
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync + 'static {
    /// Asks the platform whether location access is granted. Errors mean the
    /// platform could not answer, not that access was refused.
    async fn query_permission(&self) -> Result<PermissionState, LocationError>;

    /// Opens a continuous position watch.
    fn watch_position(&self, options: &PositionOptions) -> Subscription;

    /// Tears down a watch. Must take effect before returning; unknown ids are
    /// ignored.
    fn clear_watch(&self, id: WatchId);
}

/// Consumer of delivered positions. The tracker awaits `on_position` before
/// reading the next event, so implementations see positions one at a time.
#[async_trait]
pub trait PositionSink: Send + Sync + 'static {
    async fn on_position(&self, position: Position);
}

#[async_trait]
impl PositionSink for mpsc::UnboundedSender<Position> {
    async fn on_position(&self, position: Position) {
        if self.send(position).is_err() {
            log::debug!("position receiver dropped");
        }
    }
}
