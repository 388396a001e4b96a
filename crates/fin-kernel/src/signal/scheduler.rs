//! Listener queues and the pull/yield wait protocol.
//!
//! A processor runs one script on one logical thread. When the script pulls
//! and nothing is queued, the processor suspends until a signal is enqueued
//! or its deadline passes:
//!
//! ```text
//!            pull (empty, timed)           enqueue / tick past deadline
//! Running ─────────────────────────► Blocked ───────────────────────────► Ready
//!    ▲                                  │                                   │
//!    └──────────── cancel ──────────────┘◄──────────── resume ──────────────┘
//! ```
//!
//! Hosts drive the state machine in one of two ways: call [`ListenerQueue::tick`]
//! and [`ListenerQueue::resume`] from their own loop, or await
//! [`ListenerQueue::pull_async`] on a tokio runtime.
//!
//! The queue and the wait state share one mutex, so an enqueue can never slip
//! between the emptiness check and the suspension.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use super::trace::Signal;
use crate::error::{SignalError, SignalResult};

/// Where the processor is in the wait protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitState {
    Running,
    BlockedIndefinite,
    BlockedTimed { deadline: Instant },
    /// Woken up; the result waits for [`ListenerQueue::resume`].
    /// `None` means the deadline passed.
    Ready(Option<Signal>),
}

impl WaitState {
    pub fn is_blocked(&self) -> bool {
        matches!(self, WaitState::BlockedIndefinite | WaitState::BlockedTimed { .. })
    }
}

/// How long a pull may wait.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PullTimeout {
    /// Return at once if nothing is queued.
    Poll,
    /// Wait until a signal arrives.
    Indefinite,
    After(Duration),
}

impl PullTimeout {
    /// Map a script-level timeout in seconds: absent waits forever, zero polls.
    ///
    /// Values too large for a [`Duration`] are rejected like negative ones.
    pub fn from_secs(secs: Option<f64>) -> SignalResult<Self> {
        match secs {
            None => Ok(PullTimeout::Indefinite),
            Some(s) if !s.is_finite() || s < 0.0 => Err(SignalError::InvalidTimeout(s)),
            Some(s) if s == 0.0 => Ok(PullTimeout::Poll),
            Some(s) => Duration::try_from_secs_f64(s)
                .map(PullTimeout::After)
                .map_err(|_| SignalError::InvalidTimeout(s)),
        }
    }
}

/// Result of a synchronous pull.
#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    Signal(Signal),
    NoSignal,
    /// The processor is now blocked; the result arrives through `resume`.
    Suspended,
}

#[derive(Debug)]
struct QueueState {
    pending: VecDeque<Signal>,
    wait: WaitState,
}

/// FIFO of undelivered signals plus the owning processor's wait state.
///
/// Any thread may enqueue. Only the owning processor pulls.
#[derive(Debug)]
pub struct ListenerQueue {
    state: Mutex<QueueState>,
    wake: Notify,
}

impl Default for ListenerQueue {
    fn default() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                wait: WaitState::Running,
            }),
            wake: Notify::new(),
        }
    }
}

impl ListenerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a signal, or hand it straight to a blocked pull.
    pub fn enqueue(&self, signal: Signal) {
        let mut state = self.lock();
        if state.wait.is_blocked() && state.pending.is_empty() {
            tracing::debug!(signal = %signal.name, "signal: resume blocked pull");
            state.wait = WaitState::Ready(Some(signal));
            drop(state);
            self.wake.notify_one();
        } else {
            state.pending.push_back(signal);
        }
    }

    /// Take the oldest signal, or suspend according to `timeout`.
    ///
    /// A deadline past the end of the clock's range waits indefinitely.
    pub fn pull(&self, timeout: PullTimeout, now: Instant) -> SignalResult<PullOutcome> {
        let mut state = self.lock();
        if state.wait != WaitState::Running {
            return Err(SignalError::AlreadyWaiting);
        }
        if let Some(signal) = state.pending.pop_front() {
            return Ok(PullOutcome::Signal(signal));
        }
        state.wait = match timeout {
            PullTimeout::Poll => return Ok(PullOutcome::NoSignal),
            PullTimeout::Indefinite => WaitState::BlockedIndefinite,
            PullTimeout::After(duration) => match now.checked_add(duration) {
                Some(deadline) => WaitState::BlockedTimed { deadline },
                None => WaitState::BlockedIndefinite,
            },
        };
        tracing::debug!(?timeout, "signal: pull suspended");
        Ok(PullOutcome::Suspended)
    }

    /// Advance the clock. Returns true if a timed wait just expired.
    pub fn tick(&self, now: Instant) -> bool {
        let mut state = self.lock();
        match state.wait {
            WaitState::BlockedTimed { deadline } if now >= deadline => {
                tracing::debug!("signal: pull timed out");
                state.wait = WaitState::Ready(None);
                drop(state);
                self.wake.notify_one();
                true
            }
            _ => false,
        }
    }

    /// Collect the result of a finished wait and return to running.
    ///
    /// Returns `None` while still blocked (or when nothing was waiting).
    pub fn resume(&self) -> Option<Option<Signal>> {
        let mut state = self.lock();
        take_ready(&mut state)
    }

    /// Discard a pending wait without delivering anything. A signal that was
    /// already handed over goes back to the front of the queue.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();
        let previous = std::mem::replace(&mut state.wait, WaitState::Running);
        let cancelled = match previous {
            WaitState::Running => false,
            WaitState::Ready(Some(signal)) => {
                state.pending.push_front(signal);
                true
            }
            _ => true,
        };
        drop(state);
        if cancelled {
            tracing::debug!("signal: wait cancelled");
            self.wake.notify_one();
        }
        cancelled
    }

    /// Drop every queued signal. The wait state is untouched.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.pending.len();
        state.pending.clear();
        dropped
    }

    /// Number of queued signals.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn state(&self) -> WaitState {
        self.lock().wait.clone()
    }

    /// Pull and, if that suspends, wait for the result on the tokio clock.
    ///
    /// Fails with [`SignalError::Cancelled`] if [`cancel`](Self::cancel) runs
    /// while waiting. Dropping the future before it completes cancels the
    /// wait, so the queue can be pulled again.
    pub async fn pull_async(&self, timeout: PullTimeout) -> SignalResult<Option<Signal>> {
        match self.pull(timeout, Instant::now())? {
            PullOutcome::Signal(signal) => return Ok(Some(signal)),
            PullOutcome::NoSignal => return Ok(None),
            PullOutcome::Suspended => {}
        }
        let _guard = CancelOnDrop(self);

        loop {
            // Registered before the state check; notify_one leaves a permit otherwise.
            let notified = self.wake.notified();
            let deadline = {
                let mut state = self.lock();
                match state.wait {
                    WaitState::Ready(_) => return Ok(take_ready(&mut state).flatten()),
                    WaitState::Running => return Err(SignalError::Cancelled),
                    WaitState::BlockedTimed { deadline } => Some(deadline),
                    WaitState::BlockedIndefinite => None,
                }
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline) => {
                            self.tick(Instant::now());
                        }
                    }
                }
                None => notified.await,
            }
        }
    }
}

/// Cancels the wait of a [`ListenerQueue::pull_async`] future. Once the wait
/// has finished the state is `Running` and the cancel is a no-op.
struct CancelOnDrop<'a>(&'a ListenerQueue);

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

fn take_ready(state: &mut QueueState) -> Option<Option<Signal>> {
    if !matches!(state.wait, WaitState::Ready(_)) {
        return None;
    }
    match std::mem::replace(&mut state.wait, WaitState::Running) {
        WaitState::Ready(result) => Some(result),
        _ => None,
    }
}
