//! Routing of inbound platform events to registered handlers.
//!
//! Every routed event passes through a [`DedupGate`] first. Whatever happens
//! inside, the upstream transport is always acknowledged with success so it
//! stops redelivering.

use crate::error::{Error, HandlerError};
use crate::gate::DedupGate;
use crate::model::{Effect, EventId, Outcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::{error, info, instrument, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($tt:tt)*) => {{}};
}
#[cfg(not(feature = "tracing"))]
macro_rules! warn {
    ($($tt:tt)*) => {{}};
}
#[cfg(not(feature = "tracing"))]
macro_rules! error {
    ($($tt:tt)*) => {{}};
}

/// A decoded inbound event
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Identifier used for deduplication
    pub id: EventId,
    /// Declared event type, e.g. `im.message.receive_v1`
    pub kind: String,
    /// Button action or menu key carried by the event, if any
    pub action: Option<String>,
    /// The raw `event` body
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    header: Option<Header>,
    #[serde(default)]
    event: Value,
}

#[derive(Debug, Deserialize)]
struct Header {
    event_id: Option<String>,
    event_type: Option<String>,
}

impl InboundEvent {
    pub fn new(id: impl Into<EventId>, kind: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            action: None,
            payload,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Decode a v2 event envelope.
    ///
    /// Message events are keyed by message id, since the platform may wrap a
    /// redelivered message in a new envelope; everything else is keyed by the
    /// envelope's event id.
    pub fn from_envelope(envelope: Value) -> Result<Self, Error> {
        let Envelope { header, event } = serde_json::from_value(envelope)?;
        let header = header.ok_or_else(|| Error::Decoding("Missing 'header' field".to_string()))?;

        let kind = header
            .event_type
            .ok_or_else(|| Error::Decoding("Missing 'header.event_type' field".to_string()))?;

        let message_id = event
            .pointer("/message/message_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let id = message_id.or(header.event_id).ok_or_else(|| {
            Error::Decoding("Missing 'header.event_id' and 'event.message.message_id'".to_string())
        })?;

        let action = event
            .pointer("/action/value/action")
            .or_else(|| event.get("event_key"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            id: EventId::new(id),
            kind,
            action,
            payload: event,
        })
    }

    pub fn from_json(body: &str) -> Result<Self, Error> {
        Self::from_envelope(serde_json::from_str(body)?)
    }
}

/// Business logic for one kind of event
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &InboundEvent) -> Result<Effect, HandlerError>;
}

/// Body returned to the upstream transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub code: i32,
    pub msg: String,
}

impl Ack {
    pub fn success() -> Self {
        Self {
            code: 0,
            msg: "success".to_string(),
        }
    }
}

/// What happened to one delivery inside the router
#[derive(Debug)]
pub enum Dispatch {
    /// No handler is registered for the event
    Unrouted { route: String },
    /// A handler was found and the gate produced an outcome
    Routed { route: String, outcome: Outcome },
    /// The delivery could not be decoded or the store failed
    Rejected(Error),
}

impl Dispatch {
    /// Always success, regardless of the internal result
    pub fn ack(&self) -> Ack {
        Ack::success()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            Self::Routed { outcome, .. } => Some(outcome),
            _ => None,
        }
    }
}

/// Exact-match table from route key to handler
pub struct EventRouter {
    gate: Arc<DedupGate>,
    routes: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventRouter {
    pub fn new(gate: Arc<DedupGate>) -> Self {
        Self {
            gate,
            routes: HashMap::new(),
        }
    }

    /// Register `handler` for an event kind or an action key
    pub fn route(mut self, key: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.routes.insert(key.into(), handler);
        self
    }

    pub fn gate(&self) -> &Arc<DedupGate> {
        &self.gate
    }

    /// The action wins over the kind when both are registered.
    fn lookup(&self, event: &InboundEvent) -> (String, Option<Arc<dyn EventHandler>>) {
        if let Some(action) = &event.action {
            if let Some(handler) = self.routes.get(action) {
                return (action.clone(), Some(Arc::clone(handler)));
            }
        }
        (event.kind.clone(), self.routes.get(&event.kind).cloned())
    }

    #[cfg_attr(feature = "tracing", instrument(skip(self, event), fields(event_id = %event.id, kind = %event.kind)))]
    pub async fn dispatch(&self, event: InboundEvent) -> Dispatch {
        let (route, handler) = self.lookup(&event);
        let Some(handler) = handler else {
            warn!(route = %route, "No handler registered - ignoring event");
            return Dispatch::Unrouted { route };
        };

        let result = self
            .gate
            .admit(event.id.clone(), |_| handler.handle(&event))
            .await;

        match result {
            Ok(outcome) => {
                info!(route = %route, outcome = ?outcome, "Event dispatched");
                Dispatch::Routed { route, outcome }
            }
            Err(err) => {
                error!(route = %route, error = %err, "Dedup store failed - acknowledging anyway");
                Dispatch::Rejected(err)
            }
        }
    }

    /// Decode a raw request body and dispatch it
    pub async fn dispatch_json(&self, body: &str) -> Dispatch {
        match InboundEvent::from_json(body) {
            Ok(event) => self.dispatch(event).await,
            Err(err) => {
                warn!(error = %err, "Malformed event envelope - acknowledging anyway");
                Dispatch::Rejected(err)
            }
        }
    }
}
