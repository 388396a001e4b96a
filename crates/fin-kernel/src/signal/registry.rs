//! Per-listener registration bookkeeping.
//!
//! A [`SignalRegistry`] belongs to one network component (one computer). It
//! remembers which senders the component listens to, keeps the sender side
//! of the [`SenderHub`] in sync, and owns the component's [`ListenerQueue`].
//!
//! Registrations and the queue are independent: `clear` drops queued signals
//! and leaves registrations alone, `ignore`/`ignore_all` remove registrations
//! and leave the queue alone.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use super::hub::{Mechanism, ObjectResolver, SenderHub};
use super::scheduler::{ListenerQueue, PullOutcome, PullTimeout, WaitState};
use super::trace::{ObjectId, Signal, SignalTrace};
use crate::error::{SignalError, SignalResult};

pub struct SignalRegistry {
    listener: ObjectId,
    hub: Arc<SenderHub>,
    resolver: Arc<dyn ObjectResolver>,
    /// Forward traces, `listener -> sender`.
    registered: Mutex<BTreeSet<SignalTrace>>,
    queue: Arc<ListenerQueue>,
}

impl SignalRegistry {
    /// Create the registry for `listener` and attach its queue to the hub.
    pub fn new(listener: ObjectId, hub: Arc<SenderHub>, resolver: Arc<dyn ObjectResolver>) -> Self {
        let queue = Arc::new(ListenerQueue::new());
        hub.attach(listener, &queue);
        Self {
            listener,
            hub,
            resolver,
            registered: Mutex::new(BTreeSet::new()),
            queue,
        }
    }

    fn registered(&self) -> MutexGuard<'_, BTreeSet<SignalTrace>> {
        self.registered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn listener(&self) -> ObjectId {
        self.listener
    }

    pub fn hub(&self) -> &Arc<SenderHub> {
        &self.hub
    }

    pub fn queue(&self) -> &Arc<ListenerQueue> {
        &self.queue
    }

    /// Start listening to `sender` on every mechanism it supports.
    pub fn listen(&self, sender: ObjectId) -> SignalResult<()> {
        let capabilities = self
            .resolver
            .capabilities(sender)
            .ok_or(SignalError::InvalidObject(sender))?;
        if capabilities.is_none() {
            return Err(SignalError::UnsupportedSender(sender));
        }

        let trace = SignalTrace::new(self.listener, sender);
        let mut registered = self.registered();
        if capabilities.signal_sender {
            self.hub.add_route(Mechanism::Signal, trace.reverse());
        }
        if capabilities.hook_target {
            self.hub.add_route(Mechanism::Hook, trace.reverse());
        }
        if registered.insert(trace) {
            tracing::debug!(
                listener = %self.listener,
                %sender,
                signal = capabilities.signal_sender,
                hook = capabilities.hook_target,
                "signal: listen"
            );
        }
        Ok(())
    }

    /// Stop listening to `sender`. Returns false if it was not registered.
    pub fn ignore(&self, sender: ObjectId) -> bool {
        let trace = SignalTrace::new(self.listener, sender);
        let removed = self.registered().remove(&trace);
        self.hub.remove_route(Mechanism::Signal, trace.reverse());
        self.hub.remove_route(Mechanism::Hook, trace.reverse());
        if removed {
            tracing::debug!(listener = %self.listener, %sender, "signal: ignore");
        }
        removed
    }

    /// Stop listening to every sender. Returns how many were registered.
    pub fn ignore_all(&self) -> usize {
        let snapshot = std::mem::take(&mut *self.registered());
        for trace in &snapshot {
            self.hub.remove_route(Mechanism::Signal, trace.reverse());
            self.hub.remove_route(Mechanism::Hook, trace.reverse());
        }
        if !snapshot.is_empty() {
            tracing::debug!(listener = %self.listener, count = snapshot.len(), "signal: ignore all");
        }
        snapshot.len()
    }

    /// Drop queued signals. Registrations stay.
    pub fn clear(&self) -> usize {
        self.queue.clear()
    }

    /// Hand a signal to this listener directly, bypassing the hub.
    pub fn enqueue(&self, signal: Signal) {
        self.queue.enqueue(signal);
    }

    pub fn pull(&self, timeout: PullTimeout, now: Instant) -> SignalResult<PullOutcome> {
        self.queue.pull(timeout, now)
    }

    pub async fn pull_async(&self, timeout: PullTimeout) -> SignalResult<Option<Signal>> {
        self.queue.pull_async(timeout).await
    }

    pub fn tick(&self, now: Instant) -> bool {
        self.queue.tick(now)
    }

    pub fn resume(&self) -> Option<Option<Signal>> {
        self.queue.resume()
    }

    pub fn cancel(&self) -> bool {
        self.queue.cancel()
    }

    pub fn wait_state(&self) -> WaitState {
        self.queue.state()
    }

    /// Senders currently listened to, in id order.
    pub fn senders(&self) -> Vec<ObjectId> {
        self.registered().iter().map(SignalTrace::target).collect()
    }

    pub fn traces(&self) -> Vec<SignalTrace> {
        self.registered().iter().copied().collect()
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }
}

impl fmt::Debug for SignalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalRegistry")
            .field("listener", &self.listener)
            .field("senders", &self.senders())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Drop for SignalRegistry {
    fn drop(&mut self) {
        self.queue.cancel();
        self.ignore_all();
        self.hub.detach(self.listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Capabilities;

    const LISTENER: ObjectId = ObjectId(100);
    const SENDER: ObjectId = ObjectId(1);
    const HOOK_ONLY: ObjectId = ObjectId(2);
    const INERT: ObjectId = ObjectId(3);

    fn resolver() -> Arc<dyn ObjectResolver> {
        Arc::new(|id: ObjectId| match id.0 {
            1 => Some(Capabilities::new(true, true)),
            2 => Some(Capabilities::new(false, true)),
            3 => Some(Capabilities::new(false, false)),
            _ => None,
        })
    }

    fn setup() -> (Arc<SenderHub>, SignalRegistry) {
        let hub = Arc::new(SenderHub::new());
        let registry = SignalRegistry::new(LISTENER, hub.clone(), resolver());
        (hub, registry)
    }

    #[test]
    fn test_listen_registers_both_mechanisms() {
        let (hub, registry) = setup();
        registry.listen(SENDER).unwrap();

        let route = SignalTrace::new(SENDER, LISTENER);
        assert_eq!(hub.routes(SENDER, Mechanism::Signal), vec![route]);
        assert_eq!(hub.routes(SENDER, Mechanism::Hook), vec![route]);
        assert_eq!(registry.senders(), vec![SENDER]);
    }

    #[test]
    fn test_listen_is_idempotent() {
        let (hub, registry) = setup();
        registry.listen(SENDER).unwrap();
        registry.listen(SENDER).unwrap();
        assert_eq!(registry.traces().len(), 1);
        assert_eq!(hub.routes(SENDER, Mechanism::Signal).len(), 1);
    }

    #[test]
    fn test_hook_only_sender() {
        let (hub, registry) = setup();
        registry.listen(HOOK_ONLY).unwrap();
        assert!(hub.routes(HOOK_ONLY, Mechanism::Signal).is_empty());
        assert_eq!(hub.routes(HOOK_ONLY, Mechanism::Hook).len(), 1);

        assert_eq!(registry.ignore_all(), 1);
        assert!(hub.routes(HOOK_ONLY, Mechanism::Hook).is_empty());
    }

    #[test]
    fn test_listen_rejections() {
        let (_hub, registry) = setup();
        assert_eq!(
            registry.listen(INERT),
            Err(SignalError::UnsupportedSender(INERT))
        );
        assert_eq!(
            registry.listen(ObjectId(99)),
            Err(SignalError::InvalidObject(ObjectId(99)))
        );
        assert!(registry.senders().is_empty());
    }

    #[test]
    fn test_ignore_is_idempotent() {
        let (hub, registry) = setup();
        registry.listen(SENDER).unwrap();
        assert!(registry.ignore(SENDER));
        assert!(!registry.ignore(SENDER));
        assert!(!registry.ignore(ObjectId(99)));
        assert!(hub.routes(SENDER, Mechanism::Signal).is_empty());
        assert!(hub.routes(SENDER, Mechanism::Hook).is_empty());
    }

    #[test]
    fn test_ignore_all_keeps_queue() {
        let (hub, registry) = setup();
        registry.listen(SENDER).unwrap();
        registry.listen(HOOK_ONLY).unwrap();
        hub.fire(Mechanism::Signal, Signal::new("a", SENDER));
        hub.fire(Mechanism::Hook, Signal::new("b", HOOK_ONLY));

        assert_eq!(registry.ignore_all(), 2);
        assert!(registry.traces().is_empty());
        assert_eq!(registry.pending(), 2);

        assert_eq!(hub.fire(Mechanism::Signal, Signal::new("c", SENDER)), 0);
        assert_eq!(registry.pending(), 2);
    }

    #[test]
    fn test_clear_keeps_registrations() {
        let (hub, registry) = setup();
        registry.listen(SENDER).unwrap();
        hub.fire(Mechanism::Signal, Signal::new("a", SENDER));
        assert_eq!(registry.clear(), 1);
        assert_eq!(registry.senders(), vec![SENDER]);

        hub.fire(Mechanism::Signal, Signal::new("b", SENDER));
        assert_eq!(
            registry.pull(PullTimeout::Poll, Instant::now()).unwrap(),
            PullOutcome::Signal(Signal::new("b", SENDER))
        );
    }

    #[test]
    fn test_drop_unregisters() {
        let (hub, registry) = setup();
        registry.listen(SENDER).unwrap();
        drop(registry);
        assert!(hub.routes(SENDER, Mechanism::Signal).is_empty());
        assert!(!hub.deliver(LISTENER, Signal::new("x", SENDER)));
    }
}
