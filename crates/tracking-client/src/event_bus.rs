//! In-process publish/subscribe for cross-cutting tracking signals.
//!
//! Event names form a closed set ([`EventKind`]) and every payload shape
//! is fixed by its [`BusEvent`] variant, so a handler cannot be handed a
//! payload of the wrong type.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::error;
use tracking_core::DriverId;

#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// Transport connected (`true`) or failed / dropped / closed (`false`).
    ConnectionChange(bool),

    /// Server diagnostics, verbatim.
    Stats(Value),

    /// A presence patch was applied to a cached record.
    Presence { driver_id: DriverId, is_online: bool },

    /// A cached record was inserted or replaced.
    LocationChanged(DriverId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ConnectionChange,
    Stats,
    Presence,
    LocationChanged,
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::ConnectionChange(_) => EventKind::ConnectionChange,
            BusEvent::Stats(_) => EventKind::Stats,
            BusEvent::Presence { .. } => EventKind::Presence,
            BusEvent::LocationChanged(_) => EventKind::LocationChanged,
        }
    }
}

/// Registered callback. Identity is the `Arc` allocation.
pub type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Synchronous fan-out bus. Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<HashMap<EventKind, Vec<Handler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`. Registering the same `Arc` twice is a no-op.
    pub fn on(&self, kind: EventKind, handler: Handler) {
        let mut guard = self.handlers.lock();
        let list = guard.entry(kind).or_default();
        if !list.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            list.push(handler);
        }
    }

    pub fn off(&self, kind: EventKind, handler: &Handler) {
        let mut guard = self.handlers.lock();
        if let Some(list) = guard.get_mut(&kind) {
            list.retain(|h| !Arc::ptr_eq(h, handler));
            if list.is_empty() {
                guard.remove(&kind);
            }
        }
    }

    /// Deliver `event` to every handler registered for its kind.
    ///
    /// Handlers run on the caller's task, outside the registry lock, so
    /// they may register or remove handlers themselves. A panicking
    /// handler is logged and the remaining handlers still run.
    pub fn emit(&self, event: &BusEvent) {
        let snapshot: Vec<Handler> = {
            let guard = self.handlers.lock();
            guard.get(&event.kind()).cloned().unwrap_or_default()
        };

        for handler in snapshot {
            invoke_isolated("bus handler", || handler(event));
        }
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.handlers.lock().clear();
    }
}

/// Run a consumer callback, containing any panic it raises.
pub(crate) fn invoke_isolated(what: &str, f: impl FnOnce()) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(f)) {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic".to_string());
        error!("{} panicked: {}", what, msg);
    }
}
