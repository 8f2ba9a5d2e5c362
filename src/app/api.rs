//! Caller-facing command API.
//!
//! [`JvApi`] is cheap to clone and safe to call from any thread.  Each
//! operation validates synchronously, packs a [`PendingCommand`] and queues
//! it for the [`Dispatcher`](super::dispatcher::Dispatcher).  Only
//! `connect` and `start_server` touch the resource table beyond reading it:
//! they reserve a slot and its first session so the handle can be returned
//! immediately.
//!
//! A synchronous `Err` means no event will follow.  An `Ok` means exactly
//! one terminal event will reach the relevant callback.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::JvConfig;
use crate::error::{JvError, Result};
use crate::handle::Handle;
use crate::table::{SessionState, SlotKind, SlotProfile, clamp_sessions};
use crate::types::{
    BdAddr, ConnState, INVALID_PORT, LinkRole, MAX_DISCOVERY_UUIDS, Payload, PmId, PortId, RecordHandle,
    RequestId, Scn, SecMask, ServiceUuid, UserData,
};
use crate::validator::{self, Requirement};

use super::channels::{PortNotifier, ServiceState, Shared};
use super::commands::{Command, PendingCommand};
use super::ports::Callback;

/// Parameters of an outgoing connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParams {
    pub sec_mask: SecMask,
    pub role: LinkRole,
    pub remote_scn: Scn,
    pub peer: BdAddr,
}

/// Parameters of a listening server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerParams {
    pub sec_mask: SecMask,
    pub role: LinkRole,
    pub local_scn: Scn,
    /// Concurrent sessions; clamped to `[1, MAX_SESSIONS_PER_SLOT]`.
    pub max_sessions: u8,
}

#[derive(Clone)]
pub struct JvApi {
    shared: Arc<Shared>,
    max_read_len: u16,
}

impl JvApi {
    pub(crate) fn new(shared: Arc<Shared>, config: &JvConfig) -> Self {
        Self {
            shared,
            max_read_len: config.max_read_len,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Turn the service on.  `callback` receives `Enabled` and every later
    /// management event until `disable` completes.
    pub fn enable(&self, callback: Callback) -> Result<()> {
        if !self
            .shared
            .lifecycle
            .transition(ServiceState::Disabled, ServiceState::Enabled)
        {
            return Err(JvError::AlreadyEnabled);
        }
        self.shared.set_management(Some(callback.clone()));
        if let Err(e) = self.submit(PendingCommand::new(Command::Enable, callback)) {
            self.shared.set_management(None);
            self.shared.lifecycle.set(ServiceState::Disabled);
            return Err(e);
        }
        info!("enable accepted");
        Ok(())
    }

    /// Tear down every connection and turn the service off.  `Disabled` goes
    /// to the management callback.
    pub fn disable(&self) -> Result<()> {
        if !self
            .shared
            .lifecycle
            .transition(ServiceState::Enabled, ServiceState::Disabling)
        {
            return Err(JvError::NotEnabled);
        }
        let pending = PendingCommand {
            command: Command::Disable,
            reply_to: self.shared.management(),
        };
        if let Err(e) = self.submit(pending) {
            self.shared.lifecycle.set(ServiceState::Enabled);
            return Err(e);
        }
        info!("disable accepted");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.lifecycle.get() == ServiceState::Enabled
    }

    /// Whether the link to `peer` is currently encrypted.  Answered
    /// synchronously by the security collaborator.
    pub fn is_encrypted(&self, peer: BdAddr) -> bool {
        self.shared.security.is_link_encrypted(peer)
    }

    // ── Service discovery ─────────────────────────────────────

    pub fn start_discovery(
        &self,
        peer: BdAddr,
        uuids: &[ServiceUuid],
        user_data: UserData,
    ) -> Result<()> {
        let callback = self.management()?;
        let uuids = heapless::Vec::<ServiceUuid, MAX_DISCOVERY_UUIDS>::from_slice(uuids)
            .map_err(|()| JvError::AllocationFailure)?;
        self.submit(PendingCommand::new(
            Command::StartDiscovery {
                peer,
                uuids,
                user_data,
            },
            callback,
        ))
    }

    pub fn create_record(&self, user_data: UserData) -> Result<()> {
        let callback = self.management()?;
        self.submit(PendingCommand::new(Command::CreateRecord { user_data }, callback))
    }

    pub fn delete_record(&self, record: RecordHandle) -> Result<()> {
        let callback = self.management()?;
        self.submit(PendingCommand::new(Command::DeleteRecord { record }, callback))
    }

    // ── Connections ───────────────────────────────────────────

    /// Start an outgoing connection.  The returned handle is valid at once;
    /// `Opened` reports whether the connection came up.
    pub fn connect(
        &self,
        params: ConnectParams,
        callback: Callback,
        user_data: UserData,
    ) -> Result<Handle> {
        self.ensure_enabled()?;
        let profile = SlotProfile {
            kind: SlotKind::Client,
            sec_mask: params.sec_mask,
            role: params.role,
            scn: params.remote_scn,
            peer: Some(params.peer),
            max_sessions: 1,
            user_data,
        };
        let handle = self.reserve(callback.clone(), profile, SessionState::Connecting)?;
        self.submit_reserved(
            handle,
            PendingCommand::new(Command::Connect { handle, user_data }, callback),
        )?;
        debug!("connect {handle} to {} scn {}", params.peer, params.remote_scn);
        Ok(handle)
    }

    /// Open a listening server.  `ServerStarted` follows; each accepted
    /// peer produces an unsolicited `Opened` on its own session handle.
    pub fn start_server(
        &self,
        params: ServerParams,
        callback: Callback,
        user_data: UserData,
    ) -> Result<Handle> {
        self.ensure_enabled()?;
        let profile = SlotProfile {
            kind: SlotKind::Server,
            sec_mask: params.sec_mask,
            role: params.role,
            scn: params.local_scn,
            peer: None,
            max_sessions: clamp_sessions(params.max_sessions),
            user_data,
        };
        let handle = self.reserve(callback.clone(), profile, SessionState::Listening)?;
        self.submit_reserved(
            handle,
            PendingCommand::new(Command::StartServer { handle, user_data }, callback),
        )?;
        debug!("start server {handle} on scn {}", params.local_scn);
        Ok(handle)
    }

    /// Close one session.  A close issued before the connect completed
    /// produces a single `Closed` with reason `Cancelled`.
    pub fn close(&self, handle: Handle, user_data: UserData) -> Result<()> {
        let callback = self.target_callback(handle, Requirement::Session)?;
        self.submit(PendingCommand::new(Command::Close { handle, user_data }, callback))
    }

    /// Close every session of a server and release its slot.
    pub fn stop_server(&self, handle: Handle, user_data: UserData) -> Result<()> {
        self.ensure_enabled()?;
        let callback = self.shared.table.read(|t| {
            let target = validator::check(t, handle, false)?;
            let slot = t.slot(target.slot).ok_or(JvError::SlotInactive)?;
            if slot.profile().is_none_or(|p| p.kind != SlotKind::Server) {
                return Err(JvError::InvalidHandle);
            }
            slot.callback().cloned().ok_or(JvError::SlotInactive)
        })?;
        self.submit(PendingCommand::new(
            Command::StopServer { handle, user_data },
            callback,
        ))
    }

    // ── Data ──────────────────────────────────────────────────

    /// Read up to `len` bytes.  Requests above the configured maximum are
    /// trimmed.
    pub fn read(&self, handle: Handle, req_id: RequestId, len: u16) -> Result<()> {
        let callback = self.target_callback(handle, Requirement::OpenSession)?;
        let len = len.min(self.max_read_len);
        self.submit(PendingCommand::new(
            Command::Read {
                handle,
                req_id,
                len,
            },
            callback,
        ))
    }

    /// Queue `data` for writing.  The bytes are copied; the caller's buffer
    /// is free once this returns.
    pub fn write(&self, handle: Handle, req_id: RequestId, data: &[u8]) -> Result<()> {
        let callback = self.target_callback(handle, Requirement::OpenSession)?;
        let data = Payload::from_slice(data).map_err(|()| JvError::AllocationFailure)?;
        self.submit(PendingCommand::new(
            Command::Write {
                handle,
                req_id,
                data,
            },
            callback,
        ))
    }

    /// Underlying transport port of a session, `None` when the handle is
    /// not live or the port is not yet assigned.
    pub fn get_port_handle(&self, handle: Handle) -> Option<PortId> {
        self.shared.table.read(|t| {
            let target = validator::check(t, handle, true).ok()?;
            t.session_record(target.slot, target.session)?.port
        })
    }

    /// [`get_port_handle`](Self::get_port_handle) as a raw value, with
    /// [`INVALID_PORT`] standing in for `None`.
    pub fn get_port_handle_raw(&self, handle: Handle) -> u16 {
        self.get_port_handle(handle).map_or(INVALID_PORT, PortId::raw)
    }

    /// Bytes queued for reading, as last reported by the transport.
    pub fn ready(&self, handle: Handle) -> Result<u32> {
        self.shared.table.read(|t| {
            let target = validator::check(t, handle, true)?;
            t.session_record(target.slot, target.session)
                .map(|r| r.rx_queued)
                .ok_or(JvError::SessionInactive)
        })
    }

    // ── Power ─────────────────────────────────────────────────

    /// Bind `handle` to power policy `policy`, or remove its binding with
    /// [`PmId::CLEAR`].
    pub fn set_power_profile(&self, handle: Handle, policy: PmId, initial: ConnState) -> Result<()> {
        let callback = self.target_callback(handle, Requirement::Slot)?;
        self.submit(PendingCommand::new(
            Command::SetPowerProfile {
                handle,
                policy,
                initial,
            },
            callback,
        ))
    }

    // ── Plumbing ──────────────────────────────────────────────

    /// Ask the dispatcher loop to exit once everything queued so far has
    /// run.
    pub fn shutdown(&self) -> Result<()> {
        self.submit(PendingCommand::internal(Command::Shutdown))
    }

    /// Notification handle for the transport.
    pub fn port_notifier(&self) -> PortNotifier {
        PortNotifier::new(self.shared.clone())
    }

    pub fn pending_commands(&self) -> usize {
        self.shared.queue.len()
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(JvError::NotEnabled)
        }
    }

    fn management(&self) -> Result<Callback> {
        self.ensure_enabled()?;
        self.shared.management().ok_or(JvError::NotEnabled)
    }

    fn target_callback(&self, handle: Handle, requirement: Requirement) -> Result<Callback> {
        self.ensure_enabled()?;
        self.shared.table.read(|t| {
            let target = validator::validate(t, handle, requirement)?;
            t.callback(target.slot).ok_or(JvError::SlotInactive)
        })
    }

    /// Claim a slot and its first session.  The lifecycle is checked again
    /// under the table lock: a disable that started after `ensure_enabled`
    /// owns the table from then on.
    fn reserve(
        &self,
        callback: Callback,
        profile: SlotProfile,
        state: SessionState,
    ) -> Result<Handle> {
        let lifecycle = &self.shared.lifecycle;
        self.shared
            .table
            .write(|t| {
                if lifecycle.get() != ServiceState::Enabled {
                    return Err(JvError::NotEnabled);
                }
                let slot = t.allocate_slot(callback, profile)?;
                match t.open_session(slot, state) {
                    Ok((session, _)) => Ok(Handle::encode(slot, session)),
                    Err(e) => {
                        t.release_slot(slot);
                        Err(e.into())
                    }
                }
            })
            .inspect_err(|e| {
                if *e == JvError::Exhausted {
                    warn!("no room for a new {:?} slot", profile.kind);
                }
            })
    }

    /// Queue a command for a freshly reserved handle, rolling the
    /// reservation back if the queue is full.
    fn submit_reserved(&self, handle: Handle, pending: PendingCommand) -> Result<()> {
        self.submit(pending).inspect_err(|_| {
            self.shared.table.write(|t| t.release_slot(handle.slot()));
        })
    }

    fn submit(&self, pending: PendingCommand) -> Result<()> {
        self.shared.queue.submit(pending).map_err(|rejected| {
            warn!("queue full, rejected {}", rejected.command.name());
            JvError::Exhausted
        })
    }
}
