//! Generation counter and the per-request ticket that polls it.
//!
//! Every dispatch advances the counter. A request is current while the
//! counter still equals the generation it captured; anything else means a
//! newer request superseded it.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Default)]
pub struct GenerationCounter(Arc<AtomicU64>);

impl GenerationCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Supersede everything in flight and return the new generation.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn ticket(&self, generation: u64) -> Ticket {
        Ticket {
            counter: self.clone(),
            generation,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ticket {
    counter: GenerationCounter,
    generation: u64,
}

impl Ticket {
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_current(&self) -> bool {
        self.counter.current() == self.generation
    }

    /// `Err(Superseded)` once a newer request exists.
    pub fn checkpoint(&self) -> CoreResult<()> {
        if self.is_current() {
            Ok(())
        } else {
            Err(CoreError::Superseded {
                generation: self.generation,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_supersedes_older_tickets() {
        let counter = GenerationCounter::new();
        let first = counter.ticket(counter.advance());

        assert!(first.checkpoint().is_ok());

        let second = counter.ticket(counter.advance());

        assert!(first.checkpoint().is_err_and(|e| e.is_superseded()));
        assert!(second.is_current());
        assert_eq!(second.generation(), 2);
    }
}
