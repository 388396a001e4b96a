//! Sender-side routing of signals to listener queues.
//!
//! The hub replaces per-object listener sets: every route is a reversed
//! trace (`sender -> listener`) filed under the mechanism it was registered
//! through. The network layer calls [`SenderHub::fire`] when an object emits
//! something; the hub looks up the routes and enqueues a copy on each
//! listener's queue.
//!
//! Listener queues are held weakly. A registry that went away without
//! cleaning up just stops receiving.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use super::scheduler::ListenerQueue;
use super::trace::{ObjectId, Signal, SignalTrace};

/// The two independent ways a listener can be registered on a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mechanism {
    /// High-level signals declared by the sender.
    Signal,
    /// Lower-level hooks attached to any hook-capable object.
    Hook,
}

/// What an object supports, as reported by the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub signal_sender: bool,
    pub hook_target: bool,
}

impl Capabilities {
    pub const fn new(signal_sender: bool, hook_target: bool) -> Self {
        Self {
            signal_sender,
            hook_target,
        }
    }

    /// Neither mechanism is available.
    pub fn is_none(&self) -> bool {
        !self.signal_sender && !self.hook_target
    }
}

/// Turns an object identity into its current capabilities.
///
/// `None` means the object does not exist (or no longer exists).
pub trait ObjectResolver: Send + Sync {
    fn capabilities(&self, object: ObjectId) -> Option<Capabilities>;
}

impl<F> ObjectResolver for F
where
    F: Fn(ObjectId) -> Option<Capabilities> + Send + Sync,
{
    fn capabilities(&self, object: ObjectId) -> Option<Capabilities> {
        self(object)
    }
}

/// Routes from senders to listeners, shared by every kernel on a network.
#[derive(Debug, Default)]
pub struct SenderHub {
    routes: RwLock<HashMap<(ObjectId, Mechanism), BTreeSet<SignalTrace>>>,
    listeners: RwLock<HashMap<ObjectId, Weak<ListenerQueue>>>,
}

impl SenderHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `sender -> listener` route. Returns false if it was already there.
    pub fn add_route(&self, mechanism: Mechanism, route: SignalTrace) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        routes
            .entry((route.origin(), mechanism))
            .or_default()
            .insert(route)
    }

    /// Remove a route. Returns false if it was not registered.
    pub fn remove_route(&self, mechanism: Mechanism, route: SignalTrace) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let key = (route.origin(), mechanism);
        let Some(set) = routes.get_mut(&key) else {
            return false;
        };
        let removed = set.remove(&route);
        if set.is_empty() {
            routes.remove(&key);
        }
        removed
    }

    /// Routes currently registered on `sender` for one mechanism.
    pub fn routes(&self, sender: ObjectId, mechanism: Mechanism) -> Vec<SignalTrace> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(sender, mechanism))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Make `queue` the delivery target for `listener`.
    pub(crate) fn attach(&self, listener: ObjectId, queue: &Arc<ListenerQueue>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(listener, Arc::downgrade(queue));
    }

    pub(crate) fn detach(&self, listener: ObjectId) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&listener);
    }

    /// Deliver a signal from `signal.sender` to every listener routed through
    /// `mechanism`. Returns the number of queues that received it.
    pub fn fire(&self, mechanism: Mechanism, signal: Signal) -> usize {
        let targets: BTreeSet<ObjectId> = self
            .routes(signal.sender, mechanism)
            .into_iter()
            .map(|route| route.target())
            .collect();

        let delivered = targets
            .into_iter()
            .filter(|listener| self.deliver(*listener, signal.clone()))
            .count();
        tracing::trace!(
            sender = %signal.sender,
            signal = %signal.name,
            ?mechanism,
            delivered,
            "signal: fire"
        );
        delivered
    }

    /// Enqueue a signal on one listener's queue.
    pub fn deliver(&self, listener: ObjectId, signal: Signal) -> bool {
        let queue = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&listener)
            .and_then(Weak::upgrade);
        match queue {
            Some(queue) => {
                queue.enqueue(signal);
                true
            }
            None => {
                tracing::warn!(%listener, signal = %signal.name, "signal: listener is gone, dropping");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_are_per_mechanism() {
        let hub = SenderHub::new();
        let route = SignalTrace::new(ObjectId(1), ObjectId(10));
        assert!(hub.add_route(Mechanism::Signal, route));
        assert!(!hub.add_route(Mechanism::Signal, route));
        assert!(hub.add_route(Mechanism::Hook, route));

        assert!(hub.remove_route(Mechanism::Signal, route));
        assert!(!hub.remove_route(Mechanism::Signal, route));
        assert!(hub.routes(ObjectId(1), Mechanism::Signal).is_empty());
        assert_eq!(hub.routes(ObjectId(1), Mechanism::Hook), vec![route]);
    }

    #[test]
    fn test_fire_reaches_each_listener_once() {
        let hub = SenderHub::new();
        let a = Arc::new(ListenerQueue::new());
        let b = Arc::new(ListenerQueue::new());
        hub.attach(ObjectId(10), &a);
        hub.attach(ObjectId(11), &b);
        hub.add_route(Mechanism::Signal, SignalTrace::new(ObjectId(1), ObjectId(10)));
        hub.add_route(Mechanism::Signal, SignalTrace::new(ObjectId(1), ObjectId(11)));
        hub.add_route(Mechanism::Hook, SignalTrace::new(ObjectId(1), ObjectId(10)));

        assert_eq!(hub.fire(Mechanism::Signal, Signal::new("s", ObjectId(1))), 2);
        assert_eq!(a.pending(), 1);
        assert_eq!(b.pending(), 1);

        assert_eq!(hub.fire(Mechanism::Hook, Signal::new("h", ObjectId(1))), 1);
        assert_eq!(a.pending(), 2);
        assert_eq!(b.pending(), 1);

        assert_eq!(hub.fire(Mechanism::Signal, Signal::new("s", ObjectId(2))), 0);
    }

    #[test]
    fn test_dropped_queue_is_skipped() {
        let hub = SenderHub::new();
        let queue = Arc::new(ListenerQueue::new());
        hub.attach(ObjectId(10), &queue);
        hub.add_route(Mechanism::Signal, SignalTrace::new(ObjectId(1), ObjectId(10)));
        drop(queue);

        assert_eq!(hub.fire(Mechanism::Signal, Signal::new("s", ObjectId(1))), 0);
        assert!(!hub.deliver(ObjectId(10), Signal::new("s", ObjectId(1))));
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |id: ObjectId| (id.0 == 1).then_some(Capabilities::new(true, false));
        assert_eq!(
            resolver.capabilities(ObjectId(1)),
            Some(Capabilities::new(true, false))
        );
        assert!(resolver.capabilities(ObjectId(2)).is_none());
        assert!(Capabilities::default().is_none());
    }
}
