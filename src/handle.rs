//! Opaque connection handles.
//!
//! A handle packs a connection-slot index, a session index and a type
//! discriminant into one `u32`:
//!
//! ```text
//!  31            16 15          8 7   6            0
//! ┌────────────────┬─────────────┬───┬──────────────┐
//! │    (unused)    │ session idx │ K │   slot + 1   │
//! └────────────────┴─────────────┴───┴──────────────┘
//!                                  K = 1 for RFCOMM
//! ```
//!
//! Decoding never fails.  A malformed handle decodes to indices outside
//! `MAX_SLOTS` / `MAX_SESSIONS_PER_SLOT`, and the validator rejects it.

use core::fmt;

/// Number of connection slots in the resource table.
pub const MAX_SLOTS: usize = 30;

/// Upper bound on concurrent sessions hosted by one slot.
pub const MAX_SESSIONS_PER_SLOT: usize = 7;

const SLOT_MASK: u32 = 0x7F;
const RFCOMM_MASK: u32 = 0x80;
const SESSION_SHIFT: u32 = 8;
const SESSION_MASK: u32 = 0xFF << SESSION_SHIFT;

/// Connection kind carried in the discriminant bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Rfcomm,
    /// Any handle without the RFCOMM bit (L2CAP-style handles share the
    /// numbering space but are not served here).
    Other,
}

/// Caller-visible connection handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u32);

impl Handle {
    /// Pack `(slot, session)` into an RFCOMM handle.
    ///
    /// Only the low bits of each index are kept; in-range indices always
    /// round-trip through [`Handle::decode`].
    pub const fn encode(slot: usize, session: usize) -> Self {
        let low = ((slot as u32).wrapping_add(1) & SLOT_MASK) | RFCOMM_MASK;
        let high = ((session as u32) << SESSION_SHIFT) & SESSION_MASK;
        Self(low | high)
    }

    /// Unpack into `(slot, session)`.  Not bounds-checked.
    pub const fn decode(self) -> (usize, usize) {
        let slot = (self.0 & SLOT_MASK).wrapping_sub(1);
        let session = (self.0 & SESSION_MASK) >> SESSION_SHIFT;
        (slot as usize, session as usize)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn kind(self) -> HandleKind {
        if self.0 & RFCOMM_MASK != 0 {
            HandleKind::Rfcomm
        } else {
            HandleKind::Other
        }
    }

    /// Slot index, unchecked.
    pub const fn slot(self) -> usize {
        self.decode().0
    }

    /// Session index, unchecked.
    pub const fn session(self) -> usize {
        self.decode().1
    }

    /// True when both indices fall inside the table bounds.
    pub const fn in_bounds(self) -> bool {
        let (slot, session) = self.decode();
        slot < MAX_SLOTS && session < MAX_SESSIONS_PER_SLOT
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#06x})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, session) = self.decode();
        write!(f, "{:#06x}[{}:{}]", self.0, slot, session)
    }
}
