//! Request/response correlation over one-way pub/sub messaging
//!
//! The transport only knows how to publish and subscribe; this layer turns
//! a publish into an awaitable response by parking a oneshot sender under
//! the (response event, session, request) identity and completing it when
//! a matching message is routed back in through [`CorrelationLayer::resolve`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use shared::SessionId;

use crate::error::{SchedulerError, SchedulerResult};
use crate::traits::Transport;

/// Generated identifier distinguishing concurrent requests within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn generate() -> Self {
        RequestId(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity tuple matching a response to its pending request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CorrelationKey {
    event: String,
    session_id: SessionId,
    request_id: RequestId,
}

type PendingMap = Mutex<HashMap<CorrelationKey, oneshot::Sender<Value>>>;

pub struct CorrelationLayer<T: Transport> {
    transport: Arc<T>,
    pending: Arc<PendingMap>,
}

impl<T: Transport> CorrelationLayer<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish `request_event` and suspend until the matching message
    /// arrives on `response_event`.
    ///
    /// `payload` must be a JSON object (or null); the generated request id
    /// and the session id are injected into it before publishing, and the
    /// answering service echoes both back. A `timeout` of `None` or zero
    /// waits indefinitely; a positive timeout resolves into a recoverable
    /// [`SchedulerError::CorrelationTimeout`]. The pending entry is removed
    /// on response, timeout, and caller cancellation alike.
    pub async fn request_and_wait(
        &self,
        request_event: &str,
        response_event: &str,
        session_id: SessionId,
        payload: Value,
        timeout: Option<Duration>,
    ) -> SchedulerResult<Value> {
        let request_id = RequestId::generate();
        let key = CorrelationKey {
            event: response_event.to_string(),
            session_id,
            request_id,
        };

        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(key.clone(), tx);
        let _guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            key,
        };

        let payload = Self::stamp_identity(payload, session_id, request_id)?;
        self.transport.publish(request_event, payload).await?;

        match timeout {
            Some(window) if !window.is_zero() => {
                match tokio::time::timeout(window, rx).await {
                    Ok(Ok(response)) => Ok(response),
                    Ok(Err(_)) => Err(SchedulerError::CorrelationClosed {
                        event: response_event.to_string(),
                    }),
                    Err(_) => Err(SchedulerError::CorrelationTimeout {
                        event: response_event.to_string(),
                        timeout: window,
                    }),
                }
            }
            _ => rx.await.map_err(|_| SchedulerError::CorrelationClosed {
                event: response_event.to_string(),
            }),
        }
    }

    /// Route an inbound response to its suspended caller.
    ///
    /// A message whose identity matches no pending entry is dropped — late
    /// and duplicate deliveries are expected on a lossy bus.
    pub fn resolve(&self, event: &str, payload: &Value) {
        let identity = Self::read_identity(payload);
        let Some((session_id, request_id)) = identity else {
            tracing::debug!(event, "response without correlation identity dropped");
            return;
        };

        let key = CorrelationKey {
            event: event.to_string(),
            session_id,
            request_id,
        };

        match self.lock_pending().remove(&key) {
            Some(tx) => {
                // a caller that timed out concurrently is gone; that's fine
                let _ = tx.send(payload.clone());
            }
            None => {
                tracing::debug!(event, session = %session_id, request = %request_id,
                    "unmatched response dropped");
            }
        }
    }

    /// Number of requests still waiting for an answer
    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<CorrelationKey, oneshot::Sender<Value>>> {
        self.pending.lock().expect("correlation pending map poisoned")
    }

    fn stamp_identity(
        payload: Value,
        session_id: SessionId,
        request_id: RequestId,
    ) -> SchedulerResult<Value> {
        let mut map = match payload {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(shared::SharedError::protocol(format!(
                    "request payload must be an object, got {other}"
                ))
                .into())
            }
        };
        map.insert("sessionId".to_string(), serde_json::to_value(session_id)?);
        map.insert("requestId".to_string(), serde_json::to_value(request_id)?);
        Ok(Value::Object(map))
    }

    fn read_identity(payload: &Value) -> Option<(SessionId, RequestId)> {
        let session_id = serde_json::from_value(payload.get("sessionId")?.clone()).ok()?;
        let request_id = serde_json::from_value(payload.get("requestId")?.clone()).ok()?;
        Some((session_id, request_id))
    }
}

/// Removes the pending entry when the caller goes away, however it goes
/// away: resolved, timed out, or cancelled mid-await.
struct PendingGuard {
    pending: Arc<PendingMap>,
    key: CorrelationKey,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.key);
        }
    }
}
