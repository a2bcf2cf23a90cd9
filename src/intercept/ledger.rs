//! Resource ledgers: live allocations and outstanding resolution results.
//!
//! The allocation ledger is a fixed-capacity arena of slots with a free
//! list. Removal frees the slot instead of compacting, so slot indices stay
//! stable for the lifetime of a test. An address index keeps lookups O(1).

use std::collections::HashMap;

use super::error::LedgerError;

/// Default number of slots (`MAX_LOG`).
pub const DEFAULT_CAPACITY: usize = 4096;

/// One live allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationEntry {
    pub address: usize,
    pub size: usize,
}

/// Fixed-capacity ledger of live allocations.
#[derive(Debug, Clone)]
pub struct AllocationLedger {
    slots: Vec<Option<AllocationEntry>>,
    free: Vec<usize>,
    index: HashMap<usize, usize>,
    capacity: usize,
    live_bytes: usize,
}

impl AllocationLedger {
    /// Create an empty ledger holding at most `capacity` live entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            capacity,
            live_bytes: 0,
        }
    }

    /// Record a live block.
    pub fn insert(&mut self, address: usize, size: usize) -> Result<(), LedgerError> {
        if address == 0 {
            return Err(LedgerError::NullAddress);
        }
        if self.index.contains_key(&address) {
            return Err(LedgerError::Duplicate { address });
        }
        let entry = AllocationEntry { address, size };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None if self.slots.len() < self.capacity => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
            None => {
                return Err(LedgerError::Full {
                    capacity: self.capacity,
                })
            }
        };
        self.index.insert(address, slot);
        self.live_bytes += size;
        Ok(())
    }

    /// Drop a live block, returning its size.
    pub fn remove(&mut self, address: usize) -> Result<usize, LedgerError> {
        let slot = self
            .index
            .remove(&address)
            .ok_or(LedgerError::NotFound { address })?;
        let size = self.slots[slot].take().map(|e| e.size).unwrap_or(0);
        self.free.push(slot);
        self.live_bytes -= size;
        Ok(size)
    }

    /// Size of the live block starting at `address`.
    pub fn size_of(&self, address: usize) -> Option<usize> {
        let slot = *self.index.get(&address)?;
        self.slots[slot].map(|e| e.size)
    }

    /// True if `address` lies inside (or one past the end of) a live block.
    pub fn covers(&self, address: usize) -> bool {
        self.entries()
            .any(|e| e.address <= address && address <= e.address.saturating_add(e.size))
    }

    /// Live entries in slot order.
    pub fn entries(&self) -> impl Iterator<Item = &AllocationEntry> {
        self.slots.iter().flatten()
    }

    /// Sum of the sizes of every live block.
    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    pub fn live_count(&self) -> usize {
        self.index.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.live_count() >= self.capacity
    }

    /// Change the capacity. Fails if more blocks are live than `capacity`.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), LedgerError> {
        if capacity < self.live_count() {
            return Err(LedgerError::Full { capacity });
        }
        if self.slots.len() > capacity {
            let live: Vec<AllocationEntry> = self.entries().copied().collect();
            self.index = live
                .iter()
                .enumerate()
                .map(|(slot, e)| (e.address, slot))
                .collect();
            self.slots = live.into_iter().map(Some).collect();
            self.free.clear();
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Forget every entry.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.live_bytes = 0;
    }
}

impl Default for AllocationLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Ownership list of resolution results handed out by `getaddrinfo`.
///
/// Only list heads are registered; releasing anything else is misuse.
#[derive(Debug, Clone, Default)]
pub struct ResolutionLedger {
    heads: Vec<usize>,
}

impl ResolutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the head of a freshly produced list. Null heads are ignored.
    pub fn register(&mut self, head: usize) {
        if head != 0 {
            self.heads.push(head);
        }
    }

    /// Release a registered head.
    pub fn release(&mut self, head: usize) -> Result<(), LedgerError> {
        let pos = self
            .heads
            .iter()
            .position(|h| *h == head)
            .ok_or(LedgerError::NotFound { address: head })?;
        self.heads.remove(pos);
        Ok(())
    }

    pub fn is_registered(&self, head: usize) -> bool {
        self.heads.contains(&head)
    }

    /// Heads not yet released.
    pub fn outstanding(&self) -> &[usize] {
        &self.heads
    }

    pub fn clear(&mut self) {
        self.heads.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_track_live_bytes() {
        let mut ledger = AllocationLedger::new(4);
        ledger.insert(0x1000, 16).unwrap();
        ledger.insert(0x2000, 32).unwrap();
        assert_eq!(ledger.live_bytes(), 48);
        assert_eq!(ledger.remove(0x1000), Ok(16));
        assert_eq!(ledger.live_bytes(), 32);
        assert_eq!(ledger.live_count(), 1);
    }

    #[test]
    fn null_address_is_never_logged() {
        let mut ledger = AllocationLedger::new(4);
        assert_eq!(ledger.insert(0, 8), Err(LedgerError::NullAddress));
        assert_eq!(ledger.live_count(), 0);
    }

    #[test]
    fn full_is_distinct_from_not_found() {
        let mut ledger = AllocationLedger::new(1);
        ledger.insert(0x10, 1).unwrap();
        assert_eq!(ledger.insert(0x20, 1), Err(LedgerError::Full { capacity: 1 }));
        assert_eq!(
            ledger.remove(0x20),
            Err(LedgerError::NotFound { address: 0x20 })
        );
    }

    #[test]
    fn freed_slot_is_reused() {
        let mut ledger = AllocationLedger::new(1);
        ledger.insert(0x10, 1).unwrap();
        ledger.remove(0x10).unwrap();
        ledger.insert(0x20, 2).unwrap();
        assert_eq!(ledger.size_of(0x20), Some(2));
        assert_eq!(ledger.size_of(0x10), None);
    }

    #[test]
    fn live_address_appears_once() {
        let mut ledger = AllocationLedger::new(4);
        ledger.insert(0x10, 1).unwrap();
        assert_eq!(
            ledger.insert(0x10, 5),
            Err(LedgerError::Duplicate { address: 0x10 })
        );
        assert_eq!(ledger.live_bytes(), 1);
    }

    #[test]
    fn double_remove_is_not_found() {
        let mut ledger = AllocationLedger::new(2);
        ledger.insert(0x10, 4).unwrap();
        ledger.remove(0x10).unwrap();
        assert!(matches!(ledger.remove(0x10), Err(LedgerError::NotFound { .. })));
        assert_eq!(ledger.live_bytes(), 0);
    }

    #[test]
    fn covers_addresses_inside_blocks() {
        let mut ledger = AllocationLedger::new(2);
        ledger.insert(0x100, 0x10).unwrap();
        assert!(ledger.covers(0x100));
        assert!(ledger.covers(0x108));
        assert!(!ledger.covers(0x200));
    }

    #[test]
    fn shrinking_compacts_live_entries() {
        let mut ledger = AllocationLedger::new(4);
        for addr in [0x10, 0x20, 0x30] {
            ledger.insert(addr, 1).unwrap();
        }
        ledger.remove(0x10).unwrap();
        ledger.remove(0x20).unwrap();
        assert_eq!(ledger.set_capacity(0), Err(LedgerError::Full { capacity: 0 }));
        ledger.set_capacity(1).unwrap();
        assert_eq!(ledger.size_of(0x30), Some(1));
        assert!(ledger.is_full());
        assert!(ledger.insert(0x40, 1).is_err());
        ledger.remove(0x30).unwrap();
        ledger.insert(0x40, 1).unwrap();
    }

    #[test]
    fn resolution_release_requires_registered_head() {
        let mut ledger = ResolutionLedger::new();
        ledger.register(0xA0);
        ledger.register(0);
        assert_eq!(ledger.outstanding(), &[0xA0]);
        assert!(ledger.release(0xA8).is_err());
        assert!(ledger.release(0xA0).is_ok());
        assert!(ledger.release(0xA0).is_err());
    }
}
