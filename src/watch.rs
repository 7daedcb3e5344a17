//! Tracked addresses/outpoints and the dirty flag that drives the scheduler.
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use bitcoin::hashes::Hash as _;
use bitcoin::{OutPoint, PubkeyHash};

use crate::error::{Error, Result};

/// Point-in-time copy of the watch set, safe to hold across awaits.
#[derive(Debug, Clone, Default)]
pub struct WatchSnapshot {
    /// Watched pubkey hashes, sorted.
    pub addresses: Vec<PubkeyHash>,
    /// Watched outpoints, sorted.
    pub outpoints: Vec<OutPoint>,
}

impl WatchSnapshot {
    /// True when nothing is being watched.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.outpoints.is_empty()
    }
}

#[derive(Default)]
struct Sets {
    addresses: HashSet<PubkeyHash>,
    outpoints: HashSet<OutPoint>,
}

/// Thread-safe registry of everything the wallet asked us to watch.
///
/// Registrations only ever add; nothing is removed during a session. Every
/// successful mutation raises the dirty flag so the scheduler polls soon
/// after.
#[derive(Default)]
pub struct WatchRegistry {
    sets: Mutex<Sets>,
    dirty: AtomicBool,
}

impl WatchRegistry {
    /// Empty registry, clean flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a 20-byte pubkey hash to the watch set. Idempotent. The all-zero
    /// hash is not a spendable address and is rejected.
    pub fn register_address(&self, adr160: [u8; 20]) -> Result<()> {
        if adr160 == [0u8; 20] {
            return Err(Error::InvalidInput("all-zero pubkey hash".into()));
        }
        let pkh = PubkeyHash::from_byte_array(adr160);
        self.sets
            .lock()
            .expect("watch set lock poisoned")
            .addresses
            .insert(pkh);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Add an outpoint to the watch set. Idempotent.
    pub fn register_outpoint(&self, op: OutPoint) -> Result<()> {
        self.sets
            .lock()
            .expect("watch set lock poisoned")
            .outpoints
            .insert(op);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Consistent copy of both sets, taken under the lock so a poll cycle
    /// never observes a half-updated view. Sorted so batch URLs built from a
    /// snapshot are deterministic.
    pub fn snapshot(&self) -> WatchSnapshot {
        let sets = self.sets.lock().expect("watch set lock poisoned");
        let mut addresses: Vec<PubkeyHash> = sets.addresses.iter().copied().collect();
        let mut outpoints: Vec<OutPoint> = sets.outpoints.iter().copied().collect();
        addresses.sort_unstable();
        outpoints.sort_unstable();
        WatchSnapshot {
            addresses,
            outpoints,
        }
    }

    /// Read and clear the dirty flag in one step.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash as _;
    use bitcoin::Txid;

    #[test]
    fn registration_is_idempotent() {
        let reg = WatchRegistry::new();
        reg.register_address([7u8; 20]).unwrap();
        reg.register_address([7u8; 20]).unwrap();
        assert_eq!(reg.snapshot().addresses.len(), 1);
    }

    #[test]
    fn zero_hash_is_rejected_and_stays_clean() {
        let reg = WatchRegistry::new();
        let err = reg.register_address([0u8; 20]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!reg.take_dirty());
        assert!(reg.snapshot().is_empty());
    }

    #[test]
    fn mutation_raises_dirty_until_taken() {
        let reg = WatchRegistry::new();
        assert!(!reg.take_dirty());

        reg.register_address([1u8; 20]).unwrap();
        assert!(reg.take_dirty());
        assert!(!reg.take_dirty());

        let op = OutPoint {
            txid: Txid::from_byte_array([2u8; 32]),
            vout: 0,
        };
        reg.register_outpoint(op).unwrap();
        assert!(reg.take_dirty());
    }

    #[test]
    fn snapshot_contains_everything_registered() {
        let reg = WatchRegistry::new();
        reg.register_address([1u8; 20]).unwrap();
        reg.register_address([2u8; 20]).unwrap();
        let op = OutPoint {
            txid: Txid::from_byte_array([3u8; 32]),
            vout: 1,
        };
        reg.register_outpoint(op).unwrap();

        let snap = reg.snapshot();
        assert_eq!(snap.addresses.len(), 2);
        assert_eq!(snap.outpoints, vec![op]);
    }
}
