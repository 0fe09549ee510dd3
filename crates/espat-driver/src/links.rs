//! The link table: one slot per multiplexed connection.

use crate::config::AllocationOrder;

/// Lifecycle flags of a link slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LinkFlags(u8);

impl LinkFlags {
    /// No flags set.
    pub const NONE: LinkFlags = LinkFlags(0);
    /// The link is open.
    pub const CONNECTED: LinkFlags = LinkFlags(1 << 0);
    /// A close has been requested but not yet confirmed.
    pub const CLOSING: LinkFlags = LinkFlags(1 << 1);
    /// The link was opened by the remote side.
    pub const INCOMING: LinkFlags = LinkFlags(1 << 2);

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, other: LinkFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: LinkFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: LinkFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for LinkFlags {
    type Output = LinkFlags;

    fn bitor(self, rhs: LinkFlags) -> LinkFlags {
        LinkFlags(self.0 | rhs.0)
    }
}

/// State of one link id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSlot {
    id: u8,
    flags: LinkFlags,
    available: usize,
}

impl LinkSlot {
    fn new(id: u8) -> Self {
        Self {
            id,
            flags: LinkFlags::NONE,
            available: 0,
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn flags(&self) -> LinkFlags {
        self.flags
    }

    /// Bytes the chip has announced for this link and not yet handed over.
    pub fn available(&self) -> usize {
        self.available
    }

    pub fn is_connected(&self) -> bool {
        self.flags.contains(LinkFlags::CONNECTED)
    }

    pub fn is_closing(&self) -> bool {
        self.flags.contains(LinkFlags::CLOSING)
    }

    /// A slot is free when it is neither open, closing, nor holding data.
    pub fn is_free(&self) -> bool {
        !self.is_connected() && !self.is_closing() && self.available == 0
    }

    pub fn set_flags(&mut self, flags: LinkFlags) {
        self.flags = flags;
    }

    pub fn set_available(&mut self, available: usize) {
        self.available = available;
    }
}

/// Fixed-capacity table of link slots, indexed by link id.
#[derive(Debug, Clone)]
pub struct LinkTable {
    slots: Vec<LinkSlot>,
}

impl LinkTable {
    /// Create a table with ids `0..capacity`, all free.
    pub fn new(capacity: u8) -> Self {
        Self {
            slots: (0..capacity).map(LinkSlot::new).collect(),
        }
    }

    pub fn capacity(&self) -> u8 {
        self.slots.len() as u8
    }

    pub fn slot(&self, id: u8) -> Option<&LinkSlot> {
        self.slots.get(id as usize)
    }

    pub fn slot_mut(&mut self, id: u8) -> Option<&mut LinkSlot> {
        self.slots.get_mut(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LinkSlot> {
        self.slots.iter()
    }

    /// Find a free slot, or `None` when every slot is busy.
    pub fn allocate_free_link(&self, order: AllocationOrder) -> Option<u8> {
        match order {
            AllocationOrder::HighestFirst => self.slots.iter().rev().find(|s| s.is_free()),
            AllocationOrder::LowestFirst => self.slots.iter().find(|s| s.is_free()),
        }
        .map(|s| s.id)
    }

    pub fn connected_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_connected()).count()
    }

    /// Mark every slot free.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.flags = LinkFlags::NONE;
            slot.available = 0;
        }
    }
}
