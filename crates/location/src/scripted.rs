use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use model::position::Position;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, Instant},
};

use crate::{
    provider::{LocationProvider, PositionEvent, Subscription, WatchId},
    LocationError, PermissionState, PositionOptions,
};

#[derive(Debug, Clone)]
pub enum Step {
    Fix(Position),
    Fail(LocationError),
    Wait(Duration),
    /// Ends the watch from the provider side.
    Close,
}

struct ScriptState {
    scripts: VecDeque<Vec<Step>>,
    next_id: u64,
    live: HashMap<WatchId, JoinHandle<()>>,
    opened_at: Vec<Instant>,
}

/// Provider that plays back prepared steps. Every new watch consumes the
/// next script; once a script is exhausted the watch stays open and silent.
/// Used to replay recorded drives and to drive the tracker in tests.
pub struct ScriptedProvider {
    permission: Result<PermissionState, LocationError>,
    state: Mutex<ScriptState>,
}

impl ScriptedProvider {
    pub fn new(permission: Result<PermissionState, LocationError>) -> Self {
        Self {
            permission,
            state: Mutex::new(ScriptState {
                scripts: VecDeque::new(),
                next_id: 0,
                live: HashMap::new(),
                opened_at: Vec::new(),
            }),
        }
    }

    pub fn granted() -> Self {
        Self::new(Ok(PermissionState::Granted))
    }

    /// One watch delivering `positions`, `interval` apart.
    pub fn replay(positions: Vec<Position>, interval: Duration) -> Self {
        let mut steps = Vec::with_capacity(positions.len() * 2);
        for position in positions {
            steps.push(Step::Fix(position));
            steps.push(Step::Wait(interval));
        }
        Self::granted().with_script(steps)
    }

    pub fn with_script(self, steps: Vec<Step>) -> Self {
        self.push_script(steps);
        self
    }

    pub fn push_script(&self, steps: Vec<Step>) {
        self.state().scripts.push_back(steps);
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Watches opened and not yet cleared.
    pub fn live_watches(&self) -> usize {
        self.state().live.len()
    }

    pub fn watches_opened(&self) -> usize {
        self.state().opened_at.len()
    }

    pub fn opened_at(&self) -> Vec<Instant> {
        self.state().opened_at.clone()
    }
}

async fn play(steps: Vec<Step>, events: mpsc::Sender<PositionEvent>) {
    for step in steps {
        match step {
            Step::Fix(position) => {
                if events.send(Ok(position)).await.is_err() {
                    return;
                }
            }
            Step::Fail(why) => {
                if events.send(Err(why)).await.is_err() {
                    return;
                }
            }
            Step::Wait(duration) => sleep(duration).await,
            Step::Close => return,
        }
    }
    // keep the sender alive until the watch is cleared
    std::future::pending::<()>().await;
}

#[async_trait]
impl LocationProvider for ScriptedProvider {
    async fn query_permission(&self) -> Result<PermissionState, LocationError> {
        self.permission
    }

    fn watch_position(&self, _options: &PositionOptions) -> Subscription {
        let (events, receiver) = mpsc::channel(16);
        let mut state = self.state();
        let steps = state.scripts.pop_front().unwrap_or_default();
        let id = WatchId(state.next_id);
        state.next_id += 1;
        state.opened_at.push(Instant::now());
        state.live.insert(id, tokio::spawn(play(steps, events)));
        Subscription::new(id, receiver)
    }

    fn clear_watch(&self, id: WatchId) {
        if let Some(player) = self.state().live.remove(&id) {
            player.abort();
        }
    }
}
