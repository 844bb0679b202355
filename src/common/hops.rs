//! Hop accounting: every message between two distinct nodes costs one hop.

use tracing::trace;

use crate::common::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Kind of an inter-node message, for tracing.
pub enum Message {
    /// Routing step toward the responsible node.
    Forward,
    /// Store a record.
    Store,
    /// Fetch a record.
    Fetch,
    /// Overwrite an existing record.
    Update,
    /// Remove a record.
    Remove,
    /// Ask a node for its predecessor.
    GetPredecessor,
    /// Tell a node about a new neighbour.
    Notify,
    /// Ask a node to point a finger at a newcomer.
    FingerUpdate,
    /// Hand over records.
    Transfer,
    /// Join request entering or crossing the overlay.
    Join,
    /// Routing state sent back to a joining node.
    State,
    /// Newcomer announcing itself.
    Announce,
    /// Departure notice.
    Leave,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Counter threaded through routing and every direct node to node message.
pub struct Hops {
    count: u32,
}

impl Hops {
    pub fn new() -> Self {
        Hops { count: 0 }
    }

    /// Number of hops counted so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Account for a message from `from` to `to`. A node consulting its own
    /// state costs nothing. Returns `true` if a hop was counted.
    pub fn send(&mut self, from: &Id, to: &Id, message: Message) -> bool {
        if from == to {
            return false;
        }

        self.count += 1;
        trace!(%from, %to, ?message, hops = self.count, "hop");

        true
    }

    /// Add hops counted by a nested exchange.
    pub fn add(&mut self, hops: u32) {
        self.count += hops;
    }
}

impl From<Hops> for u32 {
    fn from(hops: Hops) -> u32 {
        hops.count
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn self_messages_are_free() {
        let a = Id::from_u64(1);
        let b = Id::from_u64(2);

        let mut hops = Hops::new();

        assert!(!hops.send(&a, &a, Message::Fetch));
        assert!(hops.send(&a, &b, Message::Forward));
        assert!(hops.send(&b, &a, Message::Store));
        hops.add(3);

        assert_eq!(hops.count(), 5);
        assert_eq!(u32::from(hops), 5);
    }
}
