//! Object identities, sender/listener edges and signal payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of an in-world object, as handed out by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(id: u64) -> Self {
        ObjectId(id)
    }
}

/// A directed edge between two objects.
///
/// The listener side stores traces as `listener -> sender`; the sender side
/// stores the reversed edge `sender -> listener`. Equality, ordering and
/// hashing use both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SignalTrace {
    origin: ObjectId,
    target: ObjectId,
}

impl SignalTrace {
    pub fn new(origin: ObjectId, target: ObjectId) -> Self {
        Self { origin, target }
    }

    pub fn origin(&self) -> ObjectId {
        self.origin
    }

    pub fn target(&self) -> ObjectId {
        self.target
    }

    /// The same edge walked the other way.
    pub fn reverse(&self) -> SignalTrace {
        SignalTrace {
            origin: self.target,
            target: self.origin,
        }
    }
}

impl fmt::Display for SignalTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.origin, self.target)
    }
}

/// A fired signal as it sits in a listener queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub sender: ObjectId,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl Signal {
    pub fn new(name: impl Into<String>, sender: ObjectId) -> Self {
        Self {
            name: name.into(),
            sender,
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<serde_json::Value>) -> Self {
        self.args = args;
        self
    }
}
