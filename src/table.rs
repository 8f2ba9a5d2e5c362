//! Resource table — connection slots, their session entries and the
//! process-wide port records.
//!
//! ```text
//!  slots[MAX_SLOTS]                         ports[MAX_PORTS]
//! ┌───────────────────────────────┐        ┌────────────────────────┐
//! │ callback · profile · teardown │        │ PortId · state · peer  │
//! │ sessions: [sub-handle; 7] ────┼──(1-based index)──▶ ...         │
//! └───────────────────────────────┘        └────────────────────────┘
//! ```
//!
//! A slot is live while it holds a callback.  A session entry is live while
//! its sub-handle is non-zero; the sub-handle indexes `ports` (1-based).
//! The table performs no I/O: it hands back the underlying `PortId`s that
//! the dispatcher must close.

use heapless::Vec;

use crate::app::ports::Callback;
use crate::error::TableError;
use crate::handle::{MAX_SESSIONS_PER_SLOT, MAX_SLOTS};
use crate::types::{BdAddr, LinkRole, PortId, Scn, SecMask, UserData};

/// Entries in the port-record table.
pub const MAX_PORTS: usize = 30;

/// Clamp a requested session cap to `[1, MAX_SESSIONS_PER_SLOT]`.
pub const fn clamp_sessions(requested: u8) -> usize {
    let n = requested as usize;
    if n == 0 {
        1
    } else if n > MAX_SESSIONS_PER_SLOT {
        MAX_SESSIONS_PER_SLOT
    } else {
        n
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Outgoing connection; one session, released with it.
    Client,
    /// Listener hosting up to `max_sessions` accepted sessions.
    Server,
}

/// Per-session connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Listening,
    Connecting,
    Open,
    Closing,
}

/// Parameters a slot was registered with.
#[derive(Debug, Clone, Copy)]
pub struct SlotProfile {
    pub kind: SlotKind,
    pub sec_mask: SecMask,
    pub role: LinkRole,
    /// Remote channel for clients, local channel for servers.
    pub scn: Scn,
    pub peer: Option<BdAddr>,
    /// Already clamped via [`clamp_sessions`].
    pub max_sessions: usize,
    /// Token from the registering call; echoed on unsolicited events.
    pub user_data: UserData,
}

/// One accepted (or pending) session within a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionEntry {
    /// 1-based index into the port table; 0 = unused.
    pub sub_handle: u8,
}

impl SessionEntry {
    pub const fn is_live(self) -> bool {
        self.sub_handle != 0
    }
}

pub struct ConnectionSlot {
    callback: Option<Callback>,
    sessions: [SessionEntry; MAX_SESSIONS_PER_SLOT],
    profile: Option<SlotProfile>,
    /// Clear the slot once its last session is released.
    teardown: bool,
}

impl ConnectionSlot {
    const fn empty() -> Self {
        Self {
            callback: None,
            sessions: [SessionEntry { sub_handle: 0 }; MAX_SESSIONS_PER_SLOT],
            profile: None,
            teardown: false,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.callback.is_some()
    }

    pub fn callback(&self) -> Option<&Callback> {
        self.callback.as_ref()
    }

    pub fn profile(&self) -> Option<&SlotProfile> {
        self.profile.as_ref()
    }

    pub fn session(&self, index: usize) -> SessionEntry {
        self.sessions.get(index).copied().unwrap_or_default()
    }

    pub fn live_sessions(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_live()).count()
    }

    pub fn is_tearing_down(&self) -> bool {
        self.teardown
    }
}

/// Underlying transport port bound to one session.
#[derive(Debug, Clone, Copy)]
pub struct PortRecord {
    /// `None` until the transport hands out a port.
    pub port: Option<PortId>,
    pub slot: usize,
    pub session: usize,
    pub state: SessionState,
    pub peer: Option<BdAddr>,
    /// Bytes the transport reports as queued for reading.
    pub rx_queued: u32,
}

/// Outcome of [`ResourceTable::release_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRelease {
    /// Transport port that was bound to the session, if any.
    pub port: Option<PortId>,
    /// The slot itself was cleared as a consequence.
    pub slot_released: bool,
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

pub struct ResourceTable {
    slots: [ConnectionSlot; MAX_SLOTS],
    ports: [Option<PortRecord>; MAX_PORTS],
}

impl ResourceTable {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| ConnectionSlot::empty()),
            ports: [None; MAX_PORTS],
        }
    }

    /// Drop every slot and port record.  Returns the transport ports that
    /// were still bound.
    pub fn reset(&mut self) -> Vec<PortId, MAX_PORTS> {
        let ports = self.bound_ports();
        *self = Self::new();
        ports
    }

    /// Claim the first free slot for `callback`.
    ///
    /// Client slots are created already marked for teardown: they go away
    /// with their single session.
    pub fn allocate_slot(
        &mut self,
        callback: Callback,
        profile: SlotProfile,
    ) -> Result<usize, TableError> {
        let index = self
            .slots
            .iter()
            .position(|s| !s.is_registered())
            .ok_or(TableError::Exhausted)?;
        let slot = &mut self.slots[index];
        *slot = ConnectionSlot::empty();
        slot.callback = Some(callback);
        slot.teardown = profile.kind == SlotKind::Client;
        slot.profile = Some(SlotProfile {
            max_sessions: profile.max_sessions.clamp(1, MAX_SESSIONS_PER_SLOT),
            ..profile
        });
        Ok(index)
    }

    /// Take a free port record for `slot`.  Returns its 1-based sub-handle.
    /// The record is not reachable from any session until bound.
    pub fn alloc_port(&mut self, slot: usize, state: SessionState) -> Result<u8, TableError> {
        let index = self
            .ports
            .iter()
            .position(Option::is_none)
            .ok_or(TableError::Exhausted)?;
        self.ports[index] = Some(PortRecord {
            port: None,
            slot,
            session: usize::MAX,
            state,
            peer: None,
            rx_queued: 0,
        });
        Ok(index as u8 + 1)
    }

    /// Bind a port record to the first free session entry of `slot`, within
    /// the slot's session cap.  Never overwrites a live entry.
    pub fn bind_session(&mut self, slot: usize, sub_handle: u8) -> Result<usize, TableError> {
        let cap = self
            .slots
            .get(slot)
            .and_then(ConnectionSlot::profile)
            .map_or(0, |p| p.max_sessions);
        let entries = &mut self.slots.get_mut(slot).ok_or(TableError::Exhausted)?.sessions;
        let session = entries[..cap]
            .iter()
            .position(|e| !e.is_live())
            .ok_or(TableError::SlotFull)?;
        entries[session].sub_handle = sub_handle;
        if let Some(record) = self.record_mut(sub_handle) {
            record.session = session;
        }
        Ok(session)
    }

    /// Allocate a port record and bind it in one step, rolling the record
    /// back when the slot is full.
    pub fn open_session(
        &mut self,
        slot: usize,
        state: SessionState,
    ) -> Result<(usize, u8), TableError> {
        let sub = self.alloc_port(slot, state)?;
        match self.bind_session(slot, sub) {
            Ok(session) => Ok((session, sub)),
            Err(e) => {
                self.ports[sub as usize - 1] = None;
                Err(e)
            }
        }
    }

    /// Clear one session entry and its port record.  When it was the last
    /// live session of a slot marked for teardown, the slot is cleared too.
    pub fn release_session(&mut self, slot: usize, session: usize) -> SessionRelease {
        let mut out = SessionRelease {
            port: None,
            slot_released: false,
        };
        let Some(s) = self.slots.get_mut(slot) else {
            return out;
        };
        let Some(entry) = s.sessions.get_mut(session) else {
            return out;
        };
        let sub = core::mem::take(entry).sub_handle;
        let teardown = s.teardown;
        let remaining = s.live_sessions();
        if sub != 0 {
            out.port = self.ports[sub as usize - 1].take().and_then(|r| r.port);
        }
        if teardown && remaining == 0 && self.slots[slot].is_registered() {
            self.slots[slot] = ConnectionSlot::empty();
            out.slot_released = true;
        }
        out
    }

    /// Clear the callback and every session of `slot`.  Returns the bound
    /// transport ports for the caller to close.
    pub fn release_slot(&mut self, slot: usize) -> Vec<PortId, MAX_SESSIONS_PER_SLOT> {
        let mut ports = Vec::new();
        let Some(s) = self.slots.get_mut(slot) else {
            return ports;
        };
        let entries = s.sessions;
        *s = ConnectionSlot::empty();
        for entry in entries.iter().filter(|e| e.is_live()) {
            if let Some(port) = self.ports[entry.sub_handle as usize - 1]
                .take()
                .and_then(|r| r.port)
            {
                // Capacity matches the session array.
                let _ = ports.push(port);
            }
        }
        ports
    }

    // ── Lookups ──────────────────────────────────────────────

    pub fn slot(&self, slot: usize) -> Option<&ConnectionSlot> {
        self.slots.get(slot)
    }

    pub fn callback(&self, slot: usize) -> Option<Callback> {
        self.slots.get(slot).and_then(|s| s.callback.clone())
    }

    /// Sub-handle of `(slot, session)`; 0 when unused or out of range.
    pub fn sub_handle(&self, slot: usize, session: usize) -> u8 {
        self.slots
            .get(slot)
            .map_or(0, |s| s.session(session).sub_handle)
    }

    pub fn record(&self, sub_handle: u8) -> Option<&PortRecord> {
        let index = (sub_handle as usize).checked_sub(1)?;
        self.ports.get(index)?.as_ref()
    }

    pub fn record_mut(&mut self, sub_handle: u8) -> Option<&mut PortRecord> {
        let index = (sub_handle as usize).checked_sub(1)?;
        self.ports.get_mut(index)?.as_mut()
    }

    /// Port record behind `(slot, session)`.
    pub fn session_record(&self, slot: usize, session: usize) -> Option<&PortRecord> {
        self.record(self.sub_handle(slot, session))
    }

    pub fn session_record_mut(&mut self, slot: usize, session: usize) -> Option<&mut PortRecord> {
        let sub = self.sub_handle(slot, session);
        self.record_mut(sub)
    }

    /// Locate the session bound to an underlying transport port.
    pub fn find_port(&self, port: PortId) -> Option<(usize, usize)> {
        self.ports
            .iter()
            .flatten()
            .find(|r| r.port == Some(port) && r.session != usize::MAX)
            .map(|r| (r.slot, r.session))
    }

    /// Sessions of `slot` currently in `state`.
    pub fn count_in_state(&self, slot: usize, state: SessionState) -> usize {
        let Some(s) = self.slots.get(slot) else {
            return 0;
        };
        s.sessions
            .iter()
            .filter_map(|e| self.record(e.sub_handle))
            .filter(|r| r.state == state)
            .count()
    }

    pub fn registered_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_registered()).count()
    }

    pub fn bound_ports(&self) -> Vec<PortId, MAX_PORTS> {
        self.ports
            .iter()
            .flatten()
            .filter_map(|r| r.port)
            .collect()
    }
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::new()
    }
}
