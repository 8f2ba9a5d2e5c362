//! Outbound events from the dispatcher to registered callbacks.

use crate::error::JvError;
use crate::handle::Handle;
use crate::types::{BdAddr, Payload, RecordHandle, RequestId, Scn, UserData};

/// Outcome carried by every terminal event.
pub type Status = Result<(), JvError>;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed by a `close` command.
    Local,
    /// Closed by the peer or the transport.
    Remote,
    /// `close` arrived before the pending connect completed.
    Cancelled,
}

/// Events delivered to callbacks.  Management events go to the callback
/// given to `enable`; the rest go to the owning slot's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JvEvent {
    // ── Management ────────────────────────────────────────
    Enabled {
        status: Status,
    },
    Disabled,
    DiscoveryComplete {
        status: Status,
        scn: Option<Scn>,
        user_data: UserData,
    },
    RecordCreated {
        status: Status,
        record: RecordHandle,
        user_data: UserData,
    },
    RecordDeleted {
        status: Status,
        record: RecordHandle,
    },

    // ── Connection ────────────────────────────────────────
    /// Server slot is listening.
    ServerStarted {
        handle: Handle,
        status: Status,
        user_data: UserData,
    },
    /// Terminal for `connect`; unsolicited for each accepted server session.
    Opened {
        handle: Handle,
        status: Status,
        peer: Option<BdAddr>,
        user_data: UserData,
    },
    Closed {
        handle: Handle,
        status: Status,
        reason: CloseReason,
        user_data: UserData,
    },
    ServerStopped {
        handle: Handle,
        status: Status,
        user_data: UserData,
    },

    // ── Data ──────────────────────────────────────────────
    ReadComplete {
        handle: Handle,
        req_id: RequestId,
        status: Status,
        data: Payload,
    },
    WriteComplete {
        handle: Handle,
        req_id: RequestId,
        status: Status,
        len: usize,
    },
    /// Unsolicited: the transport has bytes queued for reading.
    DataAvailable {
        handle: Handle,
        queued: u32,
    },

    // ── Power ─────────────────────────────────────────────
    PowerProfileSet {
        handle: Handle,
        status: Status,
    },
}

impl JvEvent {
    /// Connection handle the event concerns, if any.
    pub fn handle(&self) -> Option<Handle> {
        match self {
            Self::ServerStarted { handle, .. }
            | Self::Opened { handle, .. }
            | Self::Closed { handle, .. }
            | Self::ServerStopped { handle, .. }
            | Self::ReadComplete { handle, .. }
            | Self::WriteComplete { handle, .. }
            | Self::DataAvailable { handle, .. }
            | Self::PowerProfileSet { handle, .. } => Some(*handle),
            _ => None,
        }
    }

    /// Status of the event; `Ok` for events without one.
    pub fn status(&self) -> Status {
        match self {
            Self::Enabled { status }
            | Self::DiscoveryComplete { status, .. }
            | Self::RecordCreated { status, .. }
            | Self::RecordDeleted { status, .. }
            | Self::ServerStarted { status, .. }
            | Self::Opened { status, .. }
            | Self::Closed { status, .. }
            | Self::ServerStopped { status, .. }
            | Self::ReadComplete { status, .. }
            | Self::WriteComplete { status, .. }
            | Self::PowerProfileSet { status, .. } => *status,
            Self::Disabled | Self::DataAvailable { .. } => Ok(()),
        }
    }

    /// Request id echoed by read/write completions.
    pub fn req_id(&self) -> Option<RequestId> {
        match self {
            Self::ReadComplete { req_id, .. } | Self::WriteComplete { req_id, .. } => {
                Some(*req_id)
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Enabled { .. } => "enabled",
            Self::Disabled => "disabled",
            Self::DiscoveryComplete { .. } => "discovery-complete",
            Self::RecordCreated { .. } => "record-created",
            Self::RecordDeleted { .. } => "record-deleted",
            Self::ServerStarted { .. } => "server-started",
            Self::Opened { .. } => "opened",
            Self::Closed { .. } => "closed",
            Self::ServerStopped { .. } => "server-stopped",
            Self::ReadComplete { .. } => "read-complete",
            Self::WriteComplete { .. } => "write-complete",
            Self::DataAvailable { .. } => "data-available",
            Self::PowerProfileSet { .. } => "power-profile-set",
        }
    }
}
