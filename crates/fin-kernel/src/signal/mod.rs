//! Signals from networked objects to computers.
//!
//! - **SignalTrace**: a directed edge between two [`ObjectId`]s
//! - **SenderHub**: routes fired signals to listener queues, per [`Mechanism`]
//! - **SignalRegistry**: one listener's registrations plus its queue
//! - **ListenerQueue**: FIFO and the pull/yield wait state machine
//!
//! ```text
//! network layer ──fire──► SenderHub ──enqueue──► ListenerQueue ──pull──► script
//!                            ▲
//!      SignalRegistry ───────┘ listen / ignore
//! ```

mod hub;
mod registry;
mod scheduler;
mod trace;

pub use hub::{Capabilities, Mechanism, ObjectResolver, SenderHub};
pub use registry::SignalRegistry;
pub use scheduler::{ListenerQueue, PullOutcome, PullTimeout, WaitState};
pub use trace::{ObjectId, Signal, SignalTrace};
