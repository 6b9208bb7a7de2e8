use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use location::{push::PushProvider, Notice, Notifier, Tracker};
use route_execution::RouteSession;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

const NOTICE_HISTORY: usize = 20;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub notice: Notice,
}

/// Latest tracker notices, oldest first.
#[derive(Default)]
pub struct NoticeLog {
    entries: Mutex<VecDeque<NoticeEntry>>,
}

impl NoticeLog {
    fn lock(&self) -> MutexGuard<'_, VecDeque<NoticeEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn entries(&self) -> Vec<NoticeEntry> {
        self.lock().iter().cloned().collect()
    }
}

impl Notifier for NoticeLog {
    fn notify(&self, notice: Notice) {
        match &notice {
            Notice::Failed { error } => log::error!("tracking failed: {error}"),
            Notice::Retrying { error, .. } => log::warn!("{error}"),
            _ => log::info!("{notice:?}"),
        }
        let mut entries = self.lock();
        if entries.len() == NOTICE_HISTORY {
            entries.pop_front();
        }
        entries.push_back(NoticeEntry {
            at: Utc::now(),
            notice,
        });
    }
}

/// Everything the tracking endpoints operate on.
#[derive(Clone)]
pub struct Tracking {
    pub tracker: Arc<AsyncMutex<Tracker>>,
    pub session: Arc<RouteSession>,
    pub notices: Arc<NoticeLog>,
    /// set when positions are pushed over HTTP instead of replayed
    pub push: Option<Arc<PushProvider>>,
}

impl Tracking {
    pub fn new(tracker: Tracker, session: RouteSession, push: Option<Arc<PushProvider>>) -> Self {
        Self {
            tracker: Arc::new(AsyncMutex::new(tracker)),
            session: Arc::new(session),
            notices: Arc::new(NoticeLog::default()),
            push,
        }
    }

    pub async fn start(&self) {
        self.tracker
            .lock()
            .await
            .start(self.session.clone(), self.notices.clone());
    }

    pub async fn stop(&self) {
        self.tracker.lock().await.stop();
    }
}

#[cfg(test)]
mod tests {
    use location::LocationError;

    use super::*;

    #[test]
    fn notice_log_keeps_the_latest_entries() {
        let log = NoticeLog::default();
        for attempt in 1..=25 {
            log.notify(Notice::Retrying {
                attempt,
                max_retries: 30,
                error: LocationError::Timeout,
                delay_ms: 3000,
            });
        }
        let entries = log.entries();
        assert_eq!(entries.len(), NOTICE_HISTORY);
        assert!(matches!(
            entries[0].notice,
            Notice::Retrying { attempt: 6, .. }
        ));
        assert!(matches!(
            entries[NOTICE_HISTORY - 1].notice,
            Notice::Retrying { attempt: 25, .. }
        ));
    }
}
