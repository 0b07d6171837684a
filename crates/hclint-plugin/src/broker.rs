//! Routing of incoming requests to the services listening on a connection.
//!
//! A service listens on a stream ID. The rule set service uses the fixed
//! [`RULE_SET_STREAM`](crate::protocol::RULE_SET_STREAM); the host registers
//! a fresh ID for the runner of each `Check` and drops the registration when
//! the call ends, however it ends.

use crate::protocol::Request;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

type Routes = Arc<Mutex<HashMap<u32, mpsc::UnboundedSender<Request>>>>;

/// Allocates stream IDs and routes requests to their listeners.
#[derive(Debug)]
pub struct Broker {
    routes: Routes,
    next_id: AtomicU32,
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            routes: Routes::default(),
            next_id: AtomicU32::new(1),
        }
    }
}

impl Broker {
    /// Creates a broker with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an unused stream ID. IDs are never reused on one
    /// connection.
    pub fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Listens on `id`. Requests for it arrive on the returned receiver
    /// until the [`Registration`] is dropped.
    #[must_use]
    pub fn listen(&self, id: u32) -> (Registration, mpsc::UnboundedReceiver<Request>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        debug!(stream = id, "Registered broker stream");
        let registration = Registration {
            id,
            routes: Arc::clone(&self.routes),
        };
        (registration, rx)
    }

    /// Listens on a newly allocated stream.
    #[must_use]
    pub fn accept(&self) -> (Registration, mpsc::UnboundedReceiver<Request>) {
        self.listen(self.next_id())
    }

    /// Hands `request` to its listener. Gives the request back if nobody
    /// listens on its stream.
    ///
    /// # Errors
    ///
    /// Returns the request when its stream has no listener.
    pub fn route(&self, request: Request) -> Result<(), Request> {
        let routes = self.lock();
        match routes.get(&request.stream) {
            Some(tx) => tx.send(request).map_err(|err| err.0),
            None => Err(request),
        }
    }

    /// Returns true if something listens on `id`.
    #[must_use]
    pub fn is_registered(&self, id: u32) -> bool {
        self.lock().contains_key(&id)
    }

    /// Drops every listener, ending their receivers.
    pub fn close(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, mpsc::UnboundedSender<Request>>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A stream registration; dropping it stops routing to the stream.
#[derive(Debug)]
pub struct Registration {
    id: u32,
    routes: Routes,
}

impl Registration {
    /// The registered stream ID.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        debug!(stream = self.id, "Closed broker stream");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(stream: u32) -> Request {
        Request {
            id: 1,
            stream,
            method: "GetFiles".to_string(),
            params: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_route_to_listener() {
        let broker = Broker::new();
        let (registration, mut rx) = broker.accept();
        assert_eq!(registration.id(), 1);
        broker.route(request(1)).unwrap();
        assert_eq!(rx.try_recv().unwrap().method, "GetFiles");
    }

    #[test]
    fn test_unknown_stream_is_returned() {
        let broker = Broker::new();
        let rejected = broker.route(request(7)).unwrap_err();
        assert_eq!(rejected.stream, 7);
    }

    #[test]
    fn test_drop_unregisters() {
        let broker = Broker::new();
        let (registration, mut rx) = broker.accept();
        let id = registration.id();
        assert!(broker.is_registered(id));
        drop(registration);
        assert!(!broker.is_registered(id));
        assert!(broker.route(request(id)).is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let broker = Broker::new();
        let (first, _rx1) = broker.accept();
        let first_id = first.id();
        drop(first);
        let (second, _rx2) = broker.accept();
        assert_ne!(first_id, second.id());
    }
}
