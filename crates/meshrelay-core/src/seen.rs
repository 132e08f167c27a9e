//! Bounded, allocation-free duplicate-packet cache.
//!
//! A fixed array of [`SEEN_CAPACITY`] slots, each either empty or holding a
//! packet ID and the time it was seen. There is no heap allocation and no
//! growth: once the array fills, new entries evict old ones. This bounds
//! the relay's memory footprint regardless of mesh traffic volume, which is
//! why this is a hand-rolled array rather than a `HashMap` — a hash map
//! would need an eviction policy bolted on top to get the same guarantee.

use meshrelay_proto::PacketId;

/// Number of packet IDs the cache remembers at once.
pub const SEEN_CAPACITY: usize = 1000;
/// How long (in seconds) an entry is considered a duplicate after being
/// recorded.
pub const SEEN_TTL_SEC: u64 = 60;

#[derive(Debug, Clone, Copy)]
struct SeenEntry {
    id: PacketId,
    recorded_at: u64,
}

/// The duplicate-suppression cache itself.
///
/// `count` is a high-water mark of how many slots have ever been used, not
/// the number of currently-active entries — [`SeenCache::add`] scans the
/// full `[0, SEEN_CAPACITY)` range for a free slot but only ever needs to
/// scan `[0, count)` for lookups, so keeping this mark lets
/// [`SeenCache::check`] and [`SeenCache::prune`] skip slots that have never
/// been written.
pub struct SeenCache {
    entries: [Option<SeenEntry>; SEEN_CAPACITY],
    count: usize,
}

impl Default for SeenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SeenCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: [None; SEEN_CAPACITY], count: 0 }
    }

    /// Has `id` been recorded within the last [`SEEN_TTL_SEC`] seconds?
    ///
    /// Opportunistically retires any expired entry it walks past, even
    /// though this is logically a read — this keeps expired slots from
    /// blocking reuse until the next explicit [`SeenCache::prune`] call,
    /// and matches the reference cache's behavior exactly.
    pub fn check(&mut self, id: PacketId, now: u64) -> bool {
        for slot in &mut self.entries[..self.count] {
            let Some(entry) = slot else { continue };

            if now.saturating_sub(entry.recorded_at) > SEEN_TTL_SEC {
                *slot = None;
                continue;
            }

            if entry.id == id {
                return true;
            }
        }
        false
    }

    /// Record `id` as seen at `now`.
    ///
    /// Placement prefers the first empty-or-expired slot across the entire
    /// table (not just `[0, count)`), extending the high-water mark if that
    /// slot had never been used. If every slot is occupied by a live entry,
    /// evicts whichever entry is globally oldest.
    pub fn add(&mut self, id: PacketId, now: u64) {
        for (i, slot) in self.entries.iter_mut().enumerate() {
            let expired = matches!(slot, Some(entry) if now.saturating_sub(entry.recorded_at) > SEEN_TTL_SEC);
            if slot.is_none() || expired {
                *slot = Some(SeenEntry { id, recorded_at: now });
                if i >= self.count {
                    self.count = i + 1;
                }
                return;
            }
        }

        // Table is completely full of live entries: evict the oldest.
        let oldest_index = self
            .entries
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| entry.map_or(u64::MAX, |e| e.recorded_at))
            .map(|(i, _)| i)
            .unwrap_or(0);

        self.entries[oldest_index] = Some(SeenEntry { id, recorded_at: now });
    }

    /// Deactivate every entry in `[0, count)` that has expired.
    ///
    /// Never touches slots beyond the high-water mark since those have
    /// never held a value.
    pub fn prune(&mut self, now: u64) {
        for slot in &mut self.entries[..self.count] {
            if let Some(entry) = slot {
                if now.saturating_sub(entry.recorded_at) > SEEN_TTL_SEC {
                    *slot = None;
                }
            }
        }
    }

    /// Number of slots ever written (the high-water mark), not the number
    /// of currently-active entries.
    #[must_use]
    pub fn high_water_count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn unseen_id_is_not_a_duplicate() {
        let mut cache = SeenCache::new();
        assert!(!cache.check([1u8; 8], 0));
    }

    #[test]
    fn added_id_is_a_duplicate_immediately() {
        let mut cache = SeenCache::new();
        cache.add([1u8; 8], 100);
        assert!(cache.check([1u8; 8], 100));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let mut cache = SeenCache::new();
        cache.add([1u8; 8], 0);
        assert!(cache.check([1u8; 8], SEEN_TTL_SEC));
        assert!(!cache.check([1u8; 8], SEEN_TTL_SEC + 1));
    }

    #[test]
    fn check_retires_expired_entry_in_place() {
        let mut cache = SeenCache::new();
        cache.add([1u8; 8], 0);
        cache.check([1u8; 8], SEEN_TTL_SEC + 1);
        // Re-adding the same ID after it silently expired must succeed as
        // a fresh entry rather than being treated as already-occupied.
        cache.add([1u8; 8], SEEN_TTL_SEC + 1);
        assert!(cache.check([1u8; 8], SEEN_TTL_SEC + 1));
    }

    #[test]
    fn high_water_mark_only_grows() {
        let mut cache = SeenCache::new();
        assert_eq!(cache.high_water_count(), 0);
        cache.add([1u8; 8], 0);
        assert_eq!(cache.high_water_count(), 1);
        cache.add([2u8; 8], 0);
        assert_eq!(cache.high_water_count(), 2);
    }

    #[test]
    fn full_cache_evicts_oldest_entry() {
        let mut cache = SeenCache::new();
        for i in 0..SEEN_CAPACITY {
            let mut id = [0u8; 8];
            id[0..8].copy_from_slice(&(i as u64).to_be_bytes());
            // Space timestamps out within the TTL window so nothing expires
            // naturally; only capacity pressure should cause eviction.
            cache.add(id, 0);
        }
        assert_eq!(cache.high_water_count(), SEEN_CAPACITY);

        let mut oldest_id = [0u8; 8];
        oldest_id[0..8].copy_from_slice(&0u64.to_be_bytes());
        assert!(cache.check(oldest_id, 0));

        let mut new_id = [0xFFu8; 8];
        new_id[0] = 0xAA;
        cache.add(new_id, 1);
        assert!(cache.check(new_id, 1));
        // One of the original entries must have been evicted to make room;
        // the table can never exceed its fixed capacity worth of live data.
        assert_eq!(cache.high_water_count(), SEEN_CAPACITY);
    }

    #[test]
    fn prune_only_touches_used_slots() {
        let mut cache = SeenCache::new();
        cache.add([1u8; 8], 0);
        cache.prune(SEEN_TTL_SEC + 1);
        assert!(!cache.check([1u8; 8], SEEN_TTL_SEC + 1));
        assert_eq!(cache.high_water_count(), 1);
    }

    proptest! {
        #[test]
        fn never_reports_duplicate_for_distinct_ids(
            a in any::<[u8; 8]>(),
            b in any::<[u8; 8]>(),
        ) {
            prop_assume!(a != b);
            let mut cache = SeenCache::new();
            cache.add(a, 0);
            prop_assert!(!cache.check(b, 0));
        }

        #[test]
        fn recorded_id_is_always_seen_within_ttl(id in any::<[u8; 8]>(), now in 0u64..1_000_000) {
            let mut cache = SeenCache::new();
            cache.add(id, now);
            prop_assert!(cache.check(id, now));
        }
    }
}
