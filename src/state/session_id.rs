use std::sync::atomic::{AtomicU64, Ordering};

/// Cheap per-process unique ids: a random 128-bit seed xor a counter.
pub(crate) struct SessionIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl SessionIdGenerator {
    #[must_use]
    pub(crate) fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_id(&self) -> uuid::Uuid {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        uuid::Uuid::from_u128(self.seed ^ u128::from(seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_differ_across_calls() {
        let ids = SessionIdGenerator::new();
        let seen: std::collections::HashSet<_> = (0..64).map(|_| ids.next_id()).collect();
        assert_eq!(seen.len(), 64);
    }
}
