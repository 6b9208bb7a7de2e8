use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle, time};

use crate::{
    provider::{LocationProvider, PositionEvent, Subscription, WatchId},
    LocationError, PermissionState, PositionOptions,
};

const WATCH_BUFFER: usize = 16;

struct Watch {
    id: WatchId,
    inbox: mpsc::Sender<PositionEvent>,
    forwarder: JoinHandle<()>,
}

struct PushState {
    next_id: u64,
    permission: PermissionState,
    current: Option<Watch>,
}

/// Provider fed from outside, e.g. by the driver's device posting fixes over
/// HTTP. Only the most recent watch receives pushed events. A watch that gets
/// no event within the configured timeout reports `LocationError::Timeout`
/// and closes.
pub struct PushProvider {
    state: Mutex<PushState>,
}

impl Default for PushProvider {
    fn default() -> Self {
        Self::new(PermissionState::Granted)
    }
}

impl PushProvider {
    pub fn new(permission: PermissionState) -> Self {
        Self {
            state: Mutex::new(PushState {
                next_id: 0,
                permission,
                current: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PushState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_permission(&self, permission: PermissionState) {
        self.state().permission = permission;
    }

    pub fn has_watch(&self) -> bool {
        self.state().current.is_some()
    }

    /// Hands an event to the live watch. Returns `false` if nobody is
    /// watching or the watch is not keeping up.
    pub fn push(&self, event: PositionEvent) -> bool {
        let state = self.state();
        match &state.current {
            Some(watch) => match watch.inbox.try_send(event) {
                Ok(()) => true,
                Err(why) => {
                    log::warn!("dropping pushed position for {:?}: {}", watch.id, why);
                    false
                }
            },
            None => false,
        }
    }
}

#[async_trait]
impl LocationProvider for PushProvider {
    async fn query_permission(&self) -> Result<PermissionState, LocationError> {
        Ok(self.state().permission)
    }

    fn watch_position(&self, options: &PositionOptions) -> Subscription {
        let (inbox, mut pushed) = mpsc::channel::<PositionEvent>(WATCH_BUFFER);
        let (events, subscription_rx) = mpsc::channel::<PositionEvent>(WATCH_BUFFER);
        let timeout = options.timeout;

        let forwarder = tokio::spawn(async move {
            loop {
                match time::timeout(timeout, pushed.recv()).await {
                    Ok(Some(event)) => {
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        let _ = events.send(Err(LocationError::Timeout)).await;
                        break;
                    }
                }
            }
        });

        let mut state = self.state();
        let id = WatchId(state.next_id);
        state.next_id += 1;
        if let Some(previous) = state.current.replace(Watch {
            id,
            inbox,
            forwarder,
        }) {
            log::debug!("watch {:?} replaced by {:?}", previous.id, id);
            previous.forwarder.abort();
        }
        Subscription::new(id, subscription_rx)
    }

    fn clear_watch(&self, id: WatchId) {
        let mut state = self.state();
        if state.current.as_ref().map(|watch| watch.id) == Some(id) {
            if let Some(watch) = state.current.take() {
                watch.forwarder.abort();
            }
        }
    }
}
