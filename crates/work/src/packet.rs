//! Per-fiber key/value context.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use ulid::Ulid;

/// Identifier of one fiber (one in-flight execution of a step chain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(Ulid);

impl FiberId {
    /// Generate a new fiber id.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for FiberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutable context threaded through one fiber.
///
/// A packet is owned by exactly one fiber and moves from step to step.
/// Values written by a step stay visible to every later step of the same
/// chain until some step removes them explicitly.
pub struct Packet {
    fiber_id: FiberId,
    values: HashMap<String, Box<dyn Any + Send>>,
}

impl Packet {
    /// Create an empty packet with a fresh fiber id.
    pub fn new() -> Self {
        Self {
            fiber_id: FiberId::new(),
            values: HashMap::new(),
        }
    }

    /// Id of the fiber owning this packet.
    pub const fn fiber_id(&self) -> FiberId {
        self.fiber_id
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with<T: Any + Send>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    /// Store a typed value, replacing any previous value under `key`.
    pub fn insert<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Store an already boxed value.
    pub fn insert_boxed(&mut self, key: impl Into<String>, value: Box<dyn Any + Send>) {
        self.values.insert(key.into(), value);
    }

    /// Borrow a value if present and of type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Mutably borrow a value if present and of type `T`.
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Remove and return a value of type `T`.
    ///
    /// A value of a different type stays in place and `None` is returned.
    pub fn take<T: Any>(&mut self, key: &str) -> Option<T> {
        let boxed = self.values.remove(key)?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.values.insert(key.to_string(), other);
                None
            }
        }
    }

    /// Remove a value regardless of its type. Returns whether one was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.values.remove(key).is_some()
    }

    /// Check whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the packet holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stored keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Packet")
            .field("fiber_id", &self.fiber_id)
            .field("keys", &keys)
            .finish()
    }
}
