//! Fixed-capacity peer slot table.
//!
//! Like [`crate::seen::SeenCache`], this is a plain array rather than a
//! `HashMap`: the mesh bounds its memory and connection footprint to
//! [`MAX_PEERS`] regardless of how many link attempts arrive, and a linear
//! scan over 32 entries costs nothing compared to the I/O each entry
//! represents.
//!
//! This table is generic over the peer handle type `H` so this crate never
//! needs to know what a "connection" is — the runtime crate instantiates it
//! with whatever identifies one of its TCP streams (a slot index, a task
//! handle, anything `Clone`). Only slot bookkeeping (which handle occupies
//! which slot, when it was last heard from) lives here.

/// Maximum number of simultaneously connected peers.
pub const MAX_PEERS: usize = 32;

/// One occupied slot in a [`PeerTable`].
pub struct PeerSlot<H> {
    /// Runtime-owned handle identifying this peer's connection.
    pub handle: H,
    /// Display name for this peer (`/peers` output).
    pub name: String,
    /// Unix timestamp this peer was last heard from.
    pub last_seen: u64,
}

/// A fixed-capacity table of connected peers.
pub struct PeerTable<H> {
    slots: [Option<PeerSlot<H>>; MAX_PEERS],
}

impl<H> Default for PeerTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> PeerTable<H> {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { slots: std::array::from_fn(|_| None) }
    }

    /// Insert a new peer into the first free slot.
    ///
    /// Returns the slot index on success, or `None` if the table is already
    /// at [`MAX_PEERS`].
    pub fn insert(&mut self, handle: H, name: String, now: u64) -> Option<usize> {
        let index = self.slots.iter().position(Option::is_none)?;
        self.slots[index] = Some(PeerSlot { handle, name, last_seen: now });
        Some(index)
    }

    /// Remove the peer at `index`, if any was there.
    pub fn remove(&mut self, index: usize) -> Option<PeerSlot<H>> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Update the last-seen timestamp for the peer at `index`.
    pub fn touch(&mut self, index: usize, now: u64) {
        if let Some(Some(slot)) = self.slots.get_mut(index) {
            slot.last_seen = now;
        }
    }

    /// Borrow the slot at `index`, if occupied.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PeerSlot<H>> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Iterate over `(slot_index, slot)` for every occupied slot.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &PeerSlot<H>)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| slot.as_ref().map(|s| (i, s)))
    }

    /// Mutably borrow the slot at `index`, if occupied.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut PeerSlot<H>> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Iterate mutably over `(slot_index, slot)` for every occupied slot.
    ///
    /// Used by the runtime's fan-out path, which needs a mutable borrow of
    /// each peer's transport handle to write to it.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut PeerSlot<H>)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| slot.as_mut().map(|s| (i, s)))
    }

    /// Number of currently-occupied slots.
    ///
    /// Always computed by counting occupied slots on demand rather than
    /// maintained as a separate running counter, so it can never drift out
    /// of sync with the table's actual contents.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Whether the table has room for another peer.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.active_count() < MAX_PEERS
    }
}
