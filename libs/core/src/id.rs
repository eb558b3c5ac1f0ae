//! Actor identity.

use std::fmt;

use ulid::Ulid;

/// Unique identity of one actor incarnation.
///
/// Formatted as `act_{ulid}`. A restarted actor keeps its id; a new spawn under
/// the same name gets a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(Ulid);

impl ActorId {
    /// The prefix for actor IDs.
    pub const PREFIX: &'static str = "act";

    /// Creates a new ID with a fresh ULID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", Self::PREFIX, self.0)
    }
}
