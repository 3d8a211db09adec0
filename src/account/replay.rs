//! Replay defense for withdrawal messages.
//!
//! The host remembers the fingerprint of every withdrawal it has processed
//! until the message's expiry can no longer be valid, then forgets it.
//! Fingerprints are kept in two height-bucketed sets: one for messages
//! expiring before the rotation threshold and one for messages expiring
//! after it. When the chain passes the threshold, the first bucket is
//! dropped wholesale; its messages are all expired and the expiry check
//! rejects them before the replay check is ever consulted.

use crate::account::WithdrawalError;
use crate::types::{BlockHeight, Hash256};
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::debug;

/// Default number of blocks covered by one fingerprint bucket.
pub const DEFAULT_BUCKET_SPAN: BlockHeight = 20;

#[derive(Debug)]
struct Buckets {
    /// Fingerprints expiring before `threshold`.
    current: HashSet<Hash256>,
    /// Fingerprints expiring at or after `threshold`.
    next: HashSet<Hash256>,
    /// Height at which `current` is dropped and `next` takes its place.
    threshold: BlockHeight,
}

/// Height-bucketed set of processed withdrawal fingerprints.
///
/// `register` must be called under the same per-account serialization the
/// balance deduction uses; the internal lock only protects the set itself.
#[derive(Debug)]
pub struct ReplayGuard {
    buckets: RwLock<Buckets>,
    bucket_span: BlockHeight,
}

impl ReplayGuard {
    /// Create a guard at the given chain height.
    #[must_use]
    pub fn new(current_height: BlockHeight, bucket_span: BlockHeight) -> Self {
        let span = bucket_span.max(1);
        Self {
            buckets: RwLock::new(Buckets {
                current: HashSet::new(),
                next: HashSet::new(),
                threshold: current_height + span,
            }),
            bucket_span: span,
        }
    }

    /// Record a withdrawal fingerprint.
    ///
    /// # Errors
    ///
    /// [`WithdrawalError::Replayed`] if the fingerprint was already
    /// registered and has not yet expired out.
    pub fn register(&self, fingerprint: Hash256, expiry: BlockHeight) -> Result<(), WithdrawalError> {
        let mut buckets = self.buckets.write();
        if buckets.current.contains(&fingerprint) || buckets.next.contains(&fingerprint) {
            debug!(%fingerprint, "rejecting replayed withdrawal");
            return Err(WithdrawalError::Replayed);
        }
        if expiry < buckets.threshold {
            buckets.current.insert(fingerprint);
        } else {
            buckets.next.insert(fingerprint);
        }
        Ok(())
    }

    /// Advance the guard to a new chain height, dropping buckets whose
    /// messages can no longer pass the expiry check.
    pub fn advance(&self, current_height: BlockHeight) {
        let mut buckets = self.buckets.write();
        while current_height >= buckets.threshold {
            let dropped = buckets.current.len();
            buckets.current = std::mem::take(&mut buckets.next);
            buckets.threshold += self.bucket_span;
            if dropped > 0 {
                debug!(dropped, threshold = buckets.threshold, "rotated fingerprint bucket");
            }
        }
    }

    /// Number of fingerprints currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        let buckets = self.buckets.read();
        buckets.current.len() + buckets.next.len()
    }

    /// Whether no fingerprints are remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_fingerprint_rejected() {
        let guard = ReplayGuard::new(100, DEFAULT_BUCKET_SPAN);
        let fp = Hash256([7u8; 32]);

        guard.register(fp, 110).expect("first registration");
        assert_eq!(guard.register(fp, 110), Err(WithdrawalError::Replayed));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn test_distinct_fingerprints_accepted() {
        let guard = ReplayGuard::new(100, DEFAULT_BUCKET_SPAN);
        guard.register(Hash256([1u8; 32]), 110).expect("first");
        guard.register(Hash256([2u8; 32]), 110).expect("second");
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn test_replay_detected_across_buckets() {
        let guard = ReplayGuard::new(100, DEFAULT_BUCKET_SPAN);
        let fp = Hash256([3u8; 32]);

        // lands in the far bucket, replay attempt names a near expiry
        guard.register(fp, 150).expect("register");
        assert_eq!(guard.register(fp, 105), Err(WithdrawalError::Replayed));
    }

    #[test]
    fn test_expired_fingerprints_rotate_out() {
        let guard = ReplayGuard::new(100, DEFAULT_BUCKET_SPAN);
        let near = Hash256([4u8; 32]);
        let far = Hash256([5u8; 32]);

        guard.register(near, 110).expect("near"); // current bucket
        guard.register(far, 130).expect("far"); // next bucket
        assert_eq!(guard.len(), 2);

        // crossing one threshold drops the near bucket only
        guard.advance(120);
        assert_eq!(guard.len(), 1);
        assert_eq!(guard.register(far, 130), Err(WithdrawalError::Replayed));

        // far ahead, everything is forgotten
        guard.advance(200);
        assert!(guard.is_empty());
    }
}
