//! Supervision of the position subscription.
//!
//! The tracker keeps exactly one watch open while tracking is enabled. A
//! transient provider failure tears the watch down and opens a new one after
//! a backoff delay, up to `TrackerConfig::max_retries` consecutive times. Any
//! delivered position resets the failure count. Permission errors and
//! exhausted retries end the run until tracking is started again.

use std::{
    env,
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;

use crate::{
    provider::{LocationProvider, PositionSink, Subscription, WatchId},
    LocationError, PermissionState, PositionOptions,
};

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3000);

/// How the delay before re-subscribing grows with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Backoff {
    /// every attempt waits `retry_delay`
    Fixed,
    /// attempt `n` waits `retry_delay * n`
    Linear,
}

impl Backoff {
    pub fn delay(&self, retry_delay: Duration, attempt: u32) -> Duration {
        match self {
            Self::Fixed => retry_delay,
            Self::Linear => retry_delay.saturating_mul(attempt.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff: Backoff,
    pub options: PositionOptions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            backoff: Backoff::Linear,
            options: PositionOptions::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("ignoring invalid value '{value}' for {key}");
            None
        }
    }
}

impl TrackerConfig {
    /// Reads `LOCATION_MAX_RETRIES`, `LOCATION_RETRY_DELAY_MS`,
    /// `LOCATION_RETRY_BACKOFF` (`linear` or `fixed`) and
    /// `LOCATION_TIMEOUT_MS`, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let backoff = match env::var("LOCATION_RETRY_BACKOFF").ok().as_deref() {
            Some("fixed") => Backoff::Fixed,
            Some("linear") | None => Backoff::Linear,
            Some(other) => {
                log::warn!("unknown backoff '{other}', using linear");
                Backoff::Linear
            }
        };
        Self {
            max_retries: env_parse("LOCATION_MAX_RETRIES").unwrap_or(defaults.max_retries),
            retry_delay: env_parse("LOCATION_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_delay),
            backoff,
            options: PositionOptions {
                timeout: env_parse("LOCATION_TIMEOUT_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.options.timeout),
                ..defaults.options
            },
        }
    }

    pub fn retry_delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay(self.retry_delay, attempt)
    }
}

/// User facing messages produced while tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Notice {
    AwaitingPermission,
    TrackingStarted,
    /// transient failure, a new subscription is scheduled
    #[serde(rename_all = "camelCase")]
    Retrying {
        attempt: u32,
        max_retries: u32,
        error: LocationError,
        delay_ms: u64,
    },
    /// terminal failure, tracking stays down until restarted
    #[serde(rename_all = "camelCase")]
    Failed { error: LocationError },
}

pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notice: Notice);
}

impl Notifier for mpsc::UnboundedSender<Notice> {
    fn notify(&self, notice: Notice) {
        if self.send(notice).is_err() {
            log::debug!("notice receiver dropped");
        }
    }
}

/// Why a supervision run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerExit {
    Cancelled,
    Failed(LocationError),
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<TrackerExit>,
}

pub struct Tracker {
    provider: Arc<dyn LocationProvider>,
    config: TrackerConfig,
    generation: Arc<AtomicU64>,
    retry_count: Arc<AtomicU32>,
    live_watch: Arc<Mutex<Option<WatchId>>>,
    running: Option<Running>,
}

fn lock(live_watch: &Mutex<Option<WatchId>>) -> MutexGuard<'_, Option<WatchId>> {
    live_watch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Tracker {
    pub fn new(provider: Arc<dyn LocationProvider>, config: TrackerConfig) -> Self {
        Self {
            provider,
            config,
            generation: Arc::new(AtomicU64::new(0)),
            retry_count: Arc::new(AtomicU32::new(0)),
            live_watch: Arc::new(Mutex::new(None)),
            running: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Consecutive transient failures since the last delivered position.
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    pub fn live_watch(&self) -> Option<WatchId> {
        *lock(&self.live_watch)
    }

    /// Enables tracking. Does nothing while a run is still active, so there
    /// is never more than one subscription. A run that ended with a terminal
    /// failure is replaced by a fresh one.
    pub fn start(&mut self, sink: Arc<dyn PositionSink>, notifier: Arc<dyn Notifier>) {
        if self.is_running() {
            log::debug!("tracking already running");
            return;
        }
        self.stop();

        let cancel = CancellationToken::new();
        let generation = self.generation.load(Ordering::SeqCst);
        self.retry_count.store(0, Ordering::SeqCst);
        let supervision = Supervision {
            provider: self.provider.clone(),
            config: self.config,
            sink,
            notifier,
            cancel: cancel.clone(),
            generation,
            current_generation: self.generation.clone(),
            retry_count: self.retry_count.clone(),
            live_watch: self.live_watch.clone(),
        };
        log::info!("tracking started (generation {generation})");
        let handle = tokio::spawn(supervision.run());
        self.running = Some(Running { cancel, handle });
    }

    /// Disables tracking. The live watch is cleared before this returns and
    /// any pending retry is invalidated.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = lock(&self.live_watch).take() {
            self.provider.clear_watch(id);
        }
        log::info!("tracking stopped");
    }

    /// Waits for the current run to end on its own, e.g. after a terminal
    /// failure. Returns `None` if tracking was not running.
    pub async fn join(&mut self) -> Option<TrackerExit> {
        let running = self.running.take()?;
        match running.handle.await {
            Ok(exit) => Some(exit),
            Err(why) => {
                log::error!("tracker task ended abnormally: {why}");
                Some(TrackerExit::Cancelled)
            }
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Supervision {
    provider: Arc<dyn LocationProvider>,
    config: TrackerConfig,
    sink: Arc<dyn PositionSink>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
    generation: u64,
    current_generation: Arc<AtomicU64>,
    retry_count: Arc<AtomicU32>,
    live_watch: Arc<Mutex<Option<WatchId>>>,
}

impl Supervision {
    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
            || self.current_generation.load(Ordering::SeqCst) != self.generation
    }

    fn fail(&self, error: LocationError) -> TrackerExit {
        log::error!("tracking failed: {error}");
        self.notifier.notify(Notice::Failed { error });
        TrackerExit::Failed(error)
    }

    /// Opens a watch unless the run was cancelled. Checked under the lock
    /// `Tracker::stop` takes, so a watch is never opened after stop cleared.
    fn subscribe(&self) -> Option<Subscription> {
        let mut live = lock(&self.live_watch);
        if self.is_cancelled() {
            return None;
        }
        let subscription = self.provider.watch_position(&self.config.options);
        *live = Some(subscription.id());
        log::debug!("subscribed {:?}", subscription.id());
        Some(subscription)
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        let mut live = lock(&self.live_watch);
        if *live == Some(subscription.id()) {
            *live = None;
            self.provider.clear_watch(subscription.id());
            log::debug!("unsubscribed {:?}", subscription.id());
        }
    }

    /// Forwards positions until the watch fails. `None` means cancelled.
    async fn pump(&self, subscription: &mut Subscription) -> Option<LocationError> {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                event = subscription.next() => event,
            };
            match event {
                Some(Ok(position)) => {
                    self.retry_count.store(0, Ordering::SeqCst);
                    self.sink.on_position(position).await;
                }
                Some(Err(why)) => return Some(why),
                None => return Some(LocationError::PositionUnavailable),
            }
        }
    }

    async fn run(self) -> TrackerExit {
        let permission = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return TrackerExit::Cancelled,
            permission = self.provider.query_permission() => permission,
        };
        match permission {
            Ok(PermissionState::Denied) => return self.fail(LocationError::PermissionDenied),
            Ok(PermissionState::Prompt) => self.notifier.notify(Notice::AwaitingPermission),
            Ok(PermissionState::Granted) => self.notifier.notify(Notice::TrackingStarted),
            Err(why) => log::warn!("could not query location permission ({why}), subscribing anyway"),
        }

        loop {
            let Some(mut subscription) = self.subscribe() else {
                return TrackerExit::Cancelled;
            };
            let failure = self.pump(&mut subscription).await;
            self.unsubscribe(&subscription);
            let Some(error) = failure else {
                return TrackerExit::Cancelled;
            };

            if !error.is_transient() {
                return self.fail(error);
            }
            let retries = self.retry_count.load(Ordering::SeqCst);
            if retries >= self.config.max_retries {
                log::warn!("giving up after {retries} retries");
                return self.fail(error);
            }

            let attempt = retries + 1;
            self.retry_count.store(attempt, Ordering::SeqCst);
            let delay = self.config.retry_delay_for(attempt);
            log::warn!(
                "location error: {error}, retry {attempt}/{} in {delay:?}",
                self.config.max_retries
            );
            self.notifier.notify(Notice::Retrying {
                attempt,
                max_retries: self.config.max_retries,
                error,
                delay_ms: delay.as_millis() as u64,
            });

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return TrackerExit::Cancelled,
                _ = sleep(delay) => {}
            }
            if self.is_cancelled() {
                log::debug!("retry fired after tracking was stopped");
                return TrackerExit::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use model::position::Position;
    use tokio::{sync::mpsc, time::Instant};

    use super::*;
    use crate::scripted::{ScriptedProvider, Step};

    fn fix() -> Position {
        Position::new(-23.553509, -46.662324)
    }

    fn channels() -> (
        Arc<mpsc::UnboundedSender<Position>>,
        mpsc::UnboundedReceiver<Position>,
        Arc<mpsc::UnboundedSender<Notice>>,
        mpsc::UnboundedReceiver<Notice>,
    ) {
        let (positions_tx, positions_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        (Arc::new(positions_tx), positions_rx, Arc::new(notices_tx), notices_rx)
    }

    fn drain(notices: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<Notice> {
        let mut result = vec![];
        while let Ok(notice) = notices.try_recv() {
            result.push(notice);
        }
        result
    }

    #[test]
    fn backoff_policies() {
        let base = Duration::from_millis(3000);
        assert_eq!(Backoff::Fixed.delay(base, 4), base);
        assert_eq!(Backoff::Linear.delay(base, 1), base);
        assert_eq!(Backoff::Linear.delay(base, 3), Duration::from_millis(9000));
    }

    #[test]
    fn default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(3000));
        assert!(config.options.high_accuracy);
        assert_eq!(config.options.maximum_age, Duration::ZERO);
        assert_eq!(config.options.timeout, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_retry_count() {
        let max_retries = DEFAULT_MAX_RETRIES;
        let provider = Arc::new(ScriptedProvider::granted());
        for _ in 0..max_retries - 1 {
            provider.push_script(vec![Step::Fail(LocationError::Timeout)]);
        }
        provider.push_script(vec![Step::Fix(fix())]);

        let (sink, mut positions, notifier, mut notices) = channels();
        let mut tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        tracker.start(sink, notifier);

        assert_eq!(positions.recv().await, Some(fix()));
        assert_eq!(tracker.retry_count(), 0);
        assert_eq!(provider.watches_opened(), max_retries as usize);
        assert_eq!(provider.live_watches(), 1);

        let notices = drain(&mut notices);
        assert_eq!(notices[0], Notice::TrackingStarted);
        let retries = notices
            .iter()
            .filter(|notice| matches!(notice, Notice::Retrying { .. }))
            .count();
        assert_eq!(retries, max_retries as usize - 1);
        assert!(!notices.iter().any(|notice| matches!(notice, Notice::Failed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_back_off_linearly() {
        let provider = Arc::new(ScriptedProvider::granted());
        for _ in 0..3 {
            provider.push_script(vec![Step::Fail(LocationError::PositionUnavailable)]);
        }
        provider.push_script(vec![Step::Fix(fix())]);

        let (sink, mut positions, notifier, _notices) = channels();
        let started = Instant::now();
        let mut tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        tracker.start(sink, notifier);
        positions.recv().await;

        let opened: Vec<u64> = provider
            .opened_at()
            .iter()
            .map(|at| (*at - started).as_millis() as u64)
            .collect();
        // waits of 3s, 6s and 9s between the four subscriptions
        let expected = [0, 3000, 9000, 18000];
        assert_eq!(opened.len(), expected.len());
        for (actual, expected) in opened.iter().zip(expected) {
            assert!(
                *actual >= expected && *actual < expected + 50,
                "{opened:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_are_terminal() {
        let provider = Arc::new(ScriptedProvider::granted());
        for _ in 0..=DEFAULT_MAX_RETRIES {
            provider.push_script(vec![Step::Fail(LocationError::Timeout)]);
        }

        let (sink, _positions, notifier, mut notices) = channels();
        let mut tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        tracker.start(sink, notifier);

        assert_eq!(
            tracker.join().await,
            Some(TrackerExit::Failed(LocationError::Timeout))
        );
        assert_eq!(provider.watches_opened(), DEFAULT_MAX_RETRIES as usize + 1);
        assert_eq!(provider.live_watches(), 0);
        assert_eq!(
            drain(&mut notices).last(),
            Some(&Notice::Failed {
                error: LocationError::Timeout
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denied_is_never_retried() {
        let provider = Arc::new(
            ScriptedProvider::granted()
                .with_script(vec![Step::Fail(LocationError::PermissionDenied)]),
        );

        let (sink, _positions, notifier, mut notices) = channels();
        let mut tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        tracker.start(sink, notifier);

        assert_eq!(
            tracker.join().await,
            Some(TrackerExit::Failed(LocationError::PermissionDenied))
        );
        assert_eq!(provider.watches_opened(), 1);
        assert!(!drain(&mut notices)
            .iter()
            .any(|notice| matches!(notice, Notice::Retrying { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn denied_permission_query_never_subscribes() {
        let provider = Arc::new(ScriptedProvider::new(Ok(PermissionState::Denied)));

        let (sink, _positions, notifier, mut notices) = channels();
        let mut tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        tracker.start(sink, notifier);

        assert_eq!(
            tracker.join().await,
            Some(TrackerExit::Failed(LocationError::PermissionDenied))
        );
        assert_eq!(provider.watches_opened(), 0);
        assert_eq!(
            drain(&mut notices),
            vec![Notice::Failed {
                error: LocationError::PermissionDenied
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_permission_query_still_subscribes() {
        let provider = Arc::new(
            ScriptedProvider::new(Err(LocationError::PositionUnavailable))
                .with_script(vec![Step::Fix(fix())]),
        );

        let (sink, mut positions, notifier, mut notices) = channels();
        let mut tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        tracker.start(sink, notifier);

        assert_eq!(positions.recv().await, Some(fix()));
        assert!(drain(&mut notices).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_backoff_cancels_the_retry() {
        let provider = Arc::new(
            ScriptedProvider::granted().with_script(vec![Step::Fail(LocationError::Timeout)]),
        );

        let (sink, _positions, notifier, mut notices) = channels();
        let mut tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        tracker.start(sink, notifier);

        // wait until the first retry is scheduled
        loop {
            if let Some(Notice::Retrying { .. }) = notices.recv().await {
                break;
            }
        }
        assert_eq!(provider.live_watches(), 0);
        tracker.stop();
        assert!(!tracker.is_running());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(provider.watches_opened(), 1);
        assert_eq!(provider.live_watches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_clears_the_live_watch_synchronously() {
        let provider = Arc::new(ScriptedProvider::granted().with_script(vec![Step::Fix(fix())]));

        let (sink, mut positions, notifier, _notices) = channels();
        let mut tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        tracker.start(sink, notifier);
        positions.recv().await;

        assert_eq!(provider.live_watches(), 1);
        tracker.stop();
        assert_eq!(provider.live_watches(), 0);
        assert_eq!(tracker.live_watch(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_keeps_a_single_subscription() {
        let provider = Arc::new(ScriptedProvider::granted().with_script(vec![Step::Fix(fix())]));

        let (sink, mut positions, notifier, _notices) = channels();
        let mut tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        tracker.start(sink.clone(), notifier.clone());
        positions.recv().await;
        tracker.start(sink, notifier);
        tokio::task::yield_now().await;

        assert_eq!(provider.watches_opened(), 1);
        assert_eq!(provider.live_watches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_watch_counts_as_unavailable() {
        let provider = Arc::new(
            ScriptedProvider::granted()
                .with_script(vec![Step::Close])
                .with_script(vec![Step::Fix(fix())]),
        );

        let (sink, mut positions, notifier, mut notices) = channels();
        let mut tracker = Tracker::new(provider.clone(), TrackerConfig::default());
        tracker.start(sink, notifier);
        positions.recv().await;

        assert!(drain(&mut notices).contains(&Notice::Retrying {
            attempt: 1,
            max_retries: DEFAULT_MAX_RETRIES,
            error: LocationError::PositionUnavailable,
            delay_ms: 3000,
        }));
    }
}
