//! Request generation counter used to drop results of superseded requests.
//!
//! A component issuing overlapping async requests takes a [`Ticket`] when it
//! initiates each one and asks [`Generation::is_current`] when the result
//! arrives. Both calls must happen inside the same state lock as the write
//! they guard (see `Observable::update_if`), otherwise a newer request could
//! start between the check and the write.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Generation(AtomicU64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Supersede every outstanding ticket and return the new current one.
    pub fn advance(&self) -> Ticket {
        Ticket(self.0.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn current(&self) -> Ticket {
        Ticket(self.0.load(Ordering::Acquire))
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.current() == ticket
    }
}
