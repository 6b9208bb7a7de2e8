use std::{error, fmt, time::Duration};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod provider;
pub mod push;
pub mod scripted;
pub mod tracker;

pub use provider::{LocationProvider, PositionEvent, PositionSink, Subscription, WatchId};
pub use tracker::{Backoff, Notice, Notifier, Tracker, TrackerConfig};

/// Failures reported by a geolocation source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum LocationError {
    /// The user refused location access. Retrying can not succeed.
    PermissionDenied,
    /// The provider could not determine a position (no GPS signal etc.).
    PositionUnavailable,
    /// No position was delivered within `PositionOptions::timeout`.
    Timeout,
}

impl LocationError {
    /// Whether a fresh subscription might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PositionUnavailable | Self::Timeout)
    }
}

impl error::Error for LocationError {}

impl fmt::Display for LocationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(
                f,
                "Location permission denied. Please allow access to your location."
            ),
            Self::PositionUnavailable => write!(
                f,
                "Could not determine your location. Check that GPS is enabled."
            ),
            Self::Timeout => write!(
                f,
                "Timed out waiting for your location. Check that GPS is enabled."
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum PermissionState {
    Granted,
    Prompt,
    Denied,
}

/// Options passed to the provider when subscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    /// oldest cached fix the provider may hand out, zero forces a fresh fix
    pub maximum_age: Duration,
    pub timeout: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: Duration::ZERO,
            timeout: Duration::from_secs(30),
        }
    }
}
