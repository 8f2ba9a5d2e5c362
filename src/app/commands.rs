//! Command records queued from caller threads to the dispatcher.
//!
//! A record owns copies of everything the operation needs, including the
//! callback that will receive its terminal event.  The callback is captured
//! at submission time so a record whose target has since gone away can
//! still be resolved with a failure event.

use core::fmt;

use heapless::Vec;

use crate::handle::Handle;
use crate::types::{
    BdAddr, ConnState, MAX_DISCOVERY_UUIDS, Payload, PmId, PortId, RecordHandle, RequestId,
    ServiceUuid, UserData,
};

use super::ports::Callback;

/// Operations the dispatcher executes.
#[derive(Debug, Clone)]
pub enum Command {
    /// Terminal event: `Enabled`.
    Enable,
    /// Terminal event: `Disabled`.
    Disable,
    StartDiscovery {
        peer: BdAddr,
        uuids: Vec<ServiceUuid, MAX_DISCOVERY_UUIDS>,
        user_data: UserData,
    },
    CreateRecord {
        user_data: UserData,
    },
    DeleteRecord {
        record: RecordHandle,
    },
    /// Slot and session were reserved at submission.
    Connect {
        handle: Handle,
        user_data: UserData,
    },
    Close {
        handle: Handle,
        user_data: UserData,
    },
    /// Slot and first listening session were reserved at submission.
    StartServer {
        handle: Handle,
        user_data: UserData,
    },
    StopServer {
        handle: Handle,
        user_data: UserData,
    },
    Read {
        handle: Handle,
        req_id: RequestId,
        len: u16,
    },
    Write {
        handle: Handle,
        req_id: RequestId,
        data: Payload,
    },
    SetPowerProfile {
        handle: Handle,
        policy: PmId,
        initial: ConnState,
    },
    /// Notification from the transport about one of its ports.
    Port {
        port: PortId,
        event: PortEvent,
    },
    /// Stop the worker loop.
    Shutdown,
}

impl Command {
    /// Target connection handle, if the command addresses one.
    pub fn handle(&self) -> Option<Handle> {
        match self {
            Self::Connect { handle, .. }
            | Self::Close { handle, .. }
            | Self::StartServer { handle, .. }
            | Self::StopServer { handle, .. }
            | Self::Read { handle, .. }
            | Self::Write { handle, .. }
            | Self::SetPowerProfile { handle, .. } => Some(*handle),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::StartDiscovery { .. } => "start-discovery",
            Self::CreateRecord { .. } => "create-record",
            Self::DeleteRecord { .. } => "delete-record",
            Self::Connect { .. } => "connect",
            Self::Close { .. } => "close",
            Self::StartServer { .. } => "start-server",
            Self::StopServer { .. } => "stop-server",
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::SetPowerProfile { .. } => "set-power-profile",
            Self::Port { .. } => "port-event",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Asynchronous port activity reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortEvent {
    /// Outgoing connection established, or a listener accepted a peer.
    Connected { peer: BdAddr },
    /// Outgoing connection attempt failed.
    ConnectFailed,
    /// Peer went away.
    Disconnected,
    /// Bytes are waiting to be read.
    DataReady { queued: u32 },
}

/// One queued unit of work.
pub struct PendingCommand {
    pub command: Command,
    /// Receives the terminal event.  `None` for transport notifications and
    /// shutdown.
    pub reply_to: Option<Callback>,
}

impl PendingCommand {
    pub fn new(command: Command, reply_to: Callback) -> Self {
        Self {
            command,
            reply_to: Some(reply_to),
        }
    }

    pub fn internal(command: Command) -> Self {
        Self {
            command,
            reply_to: None,
        }
    }
}

impl fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommand")
            .field("command", &self.command)
            .field("reply_to", &self.reply_to.is_some())
            .finish()
    }
}
