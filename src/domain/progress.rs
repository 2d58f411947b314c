//! Progress notifications tied to a caller-supplied token
//!
//! [`ProgressNotifier`] performs the awaited channel write. [`ProgressTracker`] keeps
//! the per-token sequence honest (strictly increasing, terminal event last), and
//! [`ProgressReporter`] is what a handler sees: a no-op when no token was supplied.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::{
    domain::schema::SchemaError,
    errors::{InvocationError, TransportError},
    mcp::transport::MessageSink,
};

pub const PROGRESS_NOTIFICATION_METHOD: &str = "notifications/progress";
pub const PROGRESS_TOTAL: f64 = 1.0;
pub const DEFAULT_START_PROGRESS: f64 = 0.5;

/// Opaque correlation token, echoed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Integer(i64),
}

impl ProgressToken {
    /// Reads `progressToken` out of a request's `_meta` object. An absent or null
    /// token means no progress was asked for; anything that is not a string or an
    /// `i64` is rejected.
    pub fn from_meta(meta: &Map<String, Value>) -> Result<Option<Self>, SchemaError> {
        match meta.get("progressToken") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|_| {
                    SchemaError::new(
                        "_meta.progressToken",
                        "must be a string or an integer",
                    )
                }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub progress_token: ProgressToken,
    pub progress: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgressError {
    #[error("progress must be a finite, non-negative number")]
    NotFinite,
    #[error("progress must increase: {next} does not follow {previous}")]
    NotIncreasing { previous: f64, next: f64 },
    #[error("intermediate progress {progress} must stay below total {total}")]
    NotBelowTotal { progress: f64, total: f64 },
    #[error("progress already completed")]
    AlreadyComplete,
}

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    token: ProgressToken,
    total: f64,
    last: Option<f64>,
    completed: bool,
}

impl ProgressTracker {
    pub fn new(token: ProgressToken, total: f64) -> Self {
        Self {
            token,
            total,
            last: None,
            completed: false,
        }
    }

    pub fn token(&self) -> &ProgressToken {
        &self.token
    }

    /// Accepts a non-terminal progress value.
    pub fn advance(&mut self, progress: f64) -> Result<ProgressEvent, ProgressError> {
        if progress >= self.total {
            return Err(ProgressError::NotBelowTotal {
                progress,
                total: self.total,
            });
        }
        self.record(progress)
    }

    /// Produces the terminal event (`progress == total`).
    pub fn complete(&mut self) -> Result<ProgressEvent, ProgressError> {
        let event = self.record(self.total)?;
        self.completed = true;
        Ok(event)
    }

    fn record(&mut self, progress: f64) -> Result<ProgressEvent, ProgressError> {
        if self.completed {
            return Err(ProgressError::AlreadyComplete);
        }
        if !progress.is_finite() || progress < 0.0 {
            return Err(ProgressError::NotFinite);
        }
        if let Some(previous) = self.last {
            if progress <= previous {
                return Err(ProgressError::NotIncreasing {
                    previous,
                    next: progress,
                });
            }
        }

        self.last = Some(progress);
        Ok(ProgressEvent {
            progress_token: self.token.clone(),
            progress,
            total: self.total,
        })
    }
}

pub struct ProgressNotifier {
    sink: Arc<dyn MessageSink>,
}

impl ProgressNotifier {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    /// Writes one `notifications/progress` message and waits for the write to finish.
    pub async fn notify(
        &self,
        token: &ProgressToken,
        progress: f64,
        total: f64,
    ) -> Result<(), TransportError> {
        let event = ProgressEvent {
            progress_token: token.clone(),
            progress,
            total,
        };
        let message = json!({
            "jsonrpc": "2.0",
            "method": PROGRESS_NOTIFICATION_METHOD,
            "params": event,
        });
        self.sink.send(&message).await
    }
}

/// Per-invocation progress handle given to tool handlers.
pub struct ProgressReporter<'a> {
    notifier: &'a ProgressNotifier,
    tracker: Option<ProgressTracker>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(notifier: &'a ProgressNotifier, token: Option<ProgressToken>, total: f64) -> Self {
        Self {
            notifier,
            tracker: token.map(|token| ProgressTracker::new(token, total)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.tracker.is_some()
    }

    /// Sends an intermediate progress value. Does nothing without a token.
    pub async fn report(&mut self, progress: f64) -> Result<(), InvocationError> {
        let Some(tracker) = self.tracker.as_mut() else {
            return Ok(());
        };
        let event = tracker
            .advance(progress)
            .map_err(|err| InvocationError::handler(err.to_string()))?;
        self.send(event).await
    }

    pub(crate) async fn complete(&mut self) -> Result<(), InvocationError> {
        let Some(tracker) = self.tracker.as_mut() else {
            return Ok(());
        };
        let event = tracker
            .complete()
            .map_err(|err| InvocationError::handler(err.to_string()))?;
        self.send(event).await
    }

    async fn send(&self, event: ProgressEvent) -> Result<(), InvocationError> {
        self.notifier
            .notify(&event.progress_token, event.progress, event.total)
            .await?;
        Ok(())
    }
}
