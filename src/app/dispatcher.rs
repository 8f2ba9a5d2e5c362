//! Dispatcher — the single execution context.
//!
//! [`Dispatcher`] drains the command queue in FIFO order.  It is the only
//! code that calls the transport, discovery and power-policy collaborators,
//! and the only code that mutates the resource table beyond caller-side
//! slot reservation.  Every handle-addressed command is re-validated here
//! before it runs.
//!
//! ```text
//!  CommandQueue ──▶ ┌────────────────────────┐ ──▶ Transport
//!                   │       Dispatcher        │ ──▶ ServiceDiscovery
//!  SharedTable  ◀──▶│ validate · execute ·    │ ──▶ PowerPolicy
//!                   │ outbox                  │
//!                   └───────────┬────────────┘
//!                               ▼
//!                     callbacks (table unlocked)
//! ```
//!
//! Events produced while executing a command are collected in an outbox and
//! delivered after the command finishes, so no callback ever runs under the
//! table lock.  A callback may submit new commands; they queue behind the
//! current one.

use core::ops::ControlFlow;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::config::JvConfig;
use crate::error::JvError;
use crate::handle::Handle;
use crate::power::{PowerProfileBinding, PowerProfiles};
use crate::table::{SessionState, SlotKind, SlotProfile};
use crate::types::{BdAddr, ConnState, MAX_PAYLOAD, Payload, PmId, PortId, RecordHandle};
use crate::validator::{self, Requirement, Target};

use super::channels::{ServiceState, Shared};
use super::commands::{Command, PendingCommand, PortEvent};
use super::events::{CloseReason, JvEvent};
use super::ports::{
    Callback, OpenMode, OpenParams, PowerPolicy, ServiceDiscovery, Transport,
};

// ───────────────────────────────────────────────────────────────
// Dispatcher
// ───────────────────────────────────────────────────────────────

pub struct Dispatcher {
    shared: Arc<Shared>,
    config: JvConfig,
    transport: Box<dyn Transport>,
    discovery: Box<dyn ServiceDiscovery>,
    power: Box<dyn PowerPolicy>,
    profiles: PowerProfiles,
    /// Events awaiting delivery once the current command completes.
    outbox: Vec<(Callback, JvEvent)>,
    executed: u64,
}

impl Dispatcher {
    pub(crate) fn new(
        shared: Arc<Shared>,
        config: JvConfig,
        transport: Box<dyn Transport>,
        discovery: Box<dyn ServiceDiscovery>,
        power: Box<dyn PowerPolicy>,
    ) -> Self {
        let profiles = PowerProfiles::new(config.max_power_profiles as usize);
        Self {
            shared,
            config,
            transport,
            discovery,
            power,
            profiles,
            outbox: Vec::new(),
            executed: 0,
        }
    }

    // ── Driving ───────────────────────────────────────────────

    /// Execute every queued command, including those submitted by callbacks
    /// along the way.  Stops early at `Shutdown`.  Returns the number of
    /// commands executed.
    pub fn process_pending(&mut self) -> usize {
        let mut count = 0;
        while let Some(pending) = self.shared.queue.try_next() {
            count += 1;
            if self.execute(pending).is_break() {
                break;
            }
        }
        count
    }

    /// Run until a `Shutdown` command is received.
    pub async fn run(mut self) {
        info!("dispatcher running");
        loop {
            let pending = self.shared.queue.next().await;
            if self.execute(pending).is_break() {
                break;
            }
        }
        info!("dispatcher stopped after {} commands", self.executed);
    }

    /// Run on a dedicated thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("jv-dispatch".into())
            .spawn(move || futures_lite::future::block_on(self.run()))
    }

    /// Execute one command and deliver its events.
    pub fn execute(&mut self, pending: PendingCommand) -> ControlFlow<()> {
        let PendingCommand { command, reply_to } = pending;
        self.executed += 1;
        debug!("exec {} {:?}", command.name(), command.handle());
        let reply_to = reply_to.as_ref();

        match command {
            Command::Enable => self.exec_enable(reply_to),
            Command::Disable => self.exec_disable(reply_to),
            Command::StartDiscovery {
                peer,
                uuids,
                user_data,
            } => {
                let (status, scn) = if self.enabled() {
                    match self.discovery.discover(peer, &uuids) {
                        Ok(scn) => (Ok(()), scn),
                        Err(e) => {
                            warn!("discovery on {peer} failed: {e}");
                            (Err(JvError::UnderlyingFailure), None)
                        }
                    }
                } else {
                    (Err(JvError::NotEnabled), None)
                };
                self.reply(
                    reply_to,
                    JvEvent::DiscoveryComplete {
                        status,
                        scn,
                        user_data,
                    },
                );
            }
            Command::CreateRecord { user_data } => {
                let (status, record) = if self.enabled() {
                    match self.discovery.create_record() {
                        Ok(record) => (Ok(()), record),
                        Err(e) => {
                            warn!("create record failed: {e}");
                            (Err(JvError::UnderlyingFailure), 0)
                        }
                    }
                } else {
                    (Err(JvError::NotEnabled), 0)
                };
                self.reply(
                    reply_to,
                    JvEvent::RecordCreated {
                        status,
                        record,
                        user_data,
                    },
                );
            }
            Command::DeleteRecord { record } => {
                let status = self.exec_delete_record(record);
                self.reply(reply_to, JvEvent::RecordDeleted { status, record });
            }
            Command::Connect { handle, user_data } => {
                self.exec_connect(handle, user_data, reply_to);
            }
            Command::Close { handle, user_data } => self.exec_close(handle, user_data, reply_to),
            Command::StartServer { handle, user_data } => {
                self.exec_start_server(handle, user_data, reply_to);
            }
            Command::StopServer { handle, user_data } => {
                let status = self.exec_stop_server(handle);
                self.reply(
                    reply_to,
                    JvEvent::ServerStopped {
                        handle,
                        status,
                        user_data,
                    },
                );
            }
            Command::Read {
                handle,
                req_id,
                len,
            } => {
                let (status, data) = match self.exec_read(handle, len) {
                    Ok(data) => (Ok(()), data),
                    Err(e) => (Err(e), Payload::new()),
                };
                self.reply(
                    reply_to,
                    JvEvent::ReadComplete {
                        handle,
                        req_id,
                        status,
                        data,
                    },
                );
            }
            Command::Write {
                handle,
                req_id,
                data,
            } => {
                let (status, len) = match self.exec_write(handle, &data) {
                    Ok(n) => (Ok(()), n),
                    Err(e) => (Err(e), 0),
                };
                self.reply(
                    reply_to,
                    JvEvent::WriteComplete {
                        handle,
                        req_id,
                        status,
                        len,
                    },
                );
            }
            Command::SetPowerProfile {
                handle,
                policy,
                initial,
            } => {
                let status = self.exec_set_power_profile(handle, policy, initial);
                self.reply(reply_to, JvEvent::PowerProfileSet { handle, status });
            }
            Command::Port { port, event } => self.exec_port_event(port, event),
            Command::Shutdown => {
                self.flush();
                return ControlFlow::Break(());
            }
        }

        self.flush();
        ControlFlow::Continue(())
    }

    /// Bindings currently held.
    pub fn power_profiles(&self) -> &PowerProfiles {
        &self.profiles
    }

    // ── Management ────────────────────────────────────────────

    /// Work queued ahead of a pending disable still runs.
    fn enabled(&self) -> bool {
        self.shared.lifecycle.get() != ServiceState::Disabled
    }

    fn require_enabled(&self) -> Result<(), JvError> {
        if self.enabled() {
            Ok(())
        } else {
            Err(JvError::NotEnabled)
        }
    }

    fn exec_enable(&mut self, reply_to: Option<&Callback>) {
        self.profiles.clear_all();
        info!("service enabled");
        self.reply(reply_to, JvEvent::Enabled { status: Ok(()) });
    }

    fn exec_disable(&mut self, reply_to: Option<&Callback>) {
        let ports = self.shared.table.write(|t| t.reset());
        for port in &ports {
            self.transport.close(*port);
        }
        self.profiles.clear_all();
        self.shared.set_management(None);
        self.shared.lifecycle.set(ServiceState::Disabled);
        info!("service disabled, closed {} ports", ports.len());
        self.reply(reply_to, JvEvent::Disabled);
    }

    fn exec_delete_record(&mut self, record: RecordHandle) -> Result<(), JvError> {
        self.require_enabled()?;
        self.discovery.delete_record(record).map_err(|e| {
            warn!("delete record {record:#x} failed: {e}");
            JvError::UnderlyingFailure
        })
    }

    // ── Connections ───────────────────────────────────────────

    /// Slot profile and the session state behind a validated handle.
    fn lookup(
        &self,
        handle: Handle,
        requirement: Requirement,
    ) -> Result<(Target, SlotProfile, SessionState), JvError> {
        self.shared.table.read(|t| {
            let target = validator::validate(t, handle, requirement)?;
            let profile = *t
                .slot(target.slot)
                .and_then(|s| s.profile())
                .ok_or(JvError::SlotInactive)?;
            let state = t
                .session_record(target.slot, target.session)
                .map_or(SessionState::Closing, |r| r.state);
            Ok((target, profile, state))
        })
    }

    fn exec_connect(&mut self, handle: Handle, user_data: u64, reply_to: Option<&Callback>) {
        let found = self
            .require_enabled()
            .and_then(|()| self.lookup(handle, Requirement::Session))
            .and_then(|found| match found.2 {
                SessionState::Connecting => Ok(found),
                _ => Err(JvError::SessionInactive),
            });
        let (target, profile) = match found {
            Ok((target, profile, _)) => (target, profile),
            Err(e) => {
                self.reply(
                    reply_to,
                    JvEvent::Opened {
                        handle,
                        status: Err(e),
                        peer: None,
                        user_data,
                    },
                );
                return;
            }
        };

        let peer = profile.peer.unwrap_or_default();
        let params = OpenParams {
            mode: OpenMode::Connect {
                peer,
                remote_scn: profile.scn,
            },
            sec_mask: profile.sec_mask,
            role: profile.role,
        };
        match self.transport.open(&params) {
            Ok(port) => {
                self.bind_port(target, port);
                debug!("connect {handle}: {peer} scn {} on port {}", profile.scn, port.raw());
            }
            Err(e) => {
                warn!("connect {handle} to {peer} failed: {e}");
                self.release_session(handle, target);
                self.reply(
                    reply_to,
                    JvEvent::Opened {
                        handle,
                        status: Err(JvError::UnderlyingFailure),
                        peer: Some(peer),
                        user_data,
                    },
                );
            }
        }
    }

    fn exec_start_server(&mut self, handle: Handle, user_data: u64, reply_to: Option<&Callback>) {
        let found = self
            .require_enabled()
            .and_then(|()| self.lookup(handle, Requirement::Session));
        let status = match found {
            Ok((target, profile, SessionState::Listening)) => {
                match self.transport.open(&listen_params(&profile)) {
                    Ok(port) => {
                        self.bind_port(target, port);
                        info!(
                            "server {handle} listening on scn {} ({} sessions max)",
                            profile.scn, profile.max_sessions
                        );
                        Ok(())
                    }
                    Err(e) => {
                        warn!("server {handle} open failed: {e}");
                        let ports = self.shared.table.write(|t| t.release_slot(target.slot));
                        self.close_ports(&ports);
                        Err(JvError::UnderlyingFailure)
                    }
                }
            }
            Ok(_) => Err(JvError::SessionInactive),
            Err(e) => Err(e),
        };
        self.reply(
            reply_to,
            JvEvent::ServerStarted {
                handle,
                status,
                user_data,
            },
        );
    }

    fn exec_close(&mut self, handle: Handle, user_data: u64, reply_to: Option<&Callback>) {
        let taken = self.require_enabled().and_then(|()| {
            self.shared.table.write(|t| {
                let target = validator::check(t, handle, true)?;
                let record = t
                    .session_record_mut(target.slot, target.session)
                    .ok_or(JvError::SessionInactive)?;
                let prior = record.state;
                record.state = SessionState::Closing;
                let kind = t
                    .slot(target.slot)
                    .and_then(|s| s.profile())
                    .map_or(SlotKind::Client, |p| p.kind);
                Ok::<_, JvError>((target, prior, kind))
            })
        });
        let (target, prior, kind) = match taken {
            Ok(v) => v,
            Err(e) => {
                self.reply(
                    reply_to,
                    JvEvent::Closed {
                        handle,
                        status: Err(e),
                        reason: CloseReason::Local,
                        user_data,
                    },
                );
                return;
            }
        };

        self.release_session(handle, target);
        let reason = if prior == SessionState::Connecting {
            CloseReason::Cancelled
        } else {
            CloseReason::Local
        };
        debug!("close {handle}: {:?} -> closed ({:?})", prior, reason);
        self.reply(
            reply_to,
            JvEvent::Closed {
                handle,
                status: Ok(()),
                reason,
                user_data,
            },
        );
        if kind == SlotKind::Server && prior == SessionState::Open && self.config.rearm_listener {
            self.ensure_listener(target.slot);
        }
    }

    fn exec_stop_server(&mut self, handle: Handle) -> Result<(), JvError> {
        self.require_enabled()?;
        let ports = self.shared.table.write(|t| {
            let target = validator::check(t, handle, false)?;
            let is_server = t
                .slot(target.slot)
                .and_then(|s| s.profile())
                .is_some_and(|p| p.kind == SlotKind::Server);
            if !is_server {
                return Err(JvError::InvalidHandle);
            }
            Ok::<_, JvError>(t.release_slot(target.slot))
        })?;
        self.close_ports(&ports);
        self.drop_slot_profiles(handle.slot());
        info!("server {handle} stopped, closed {} ports", ports.len());
        Ok(())
    }

    // ── Data ──────────────────────────────────────────────────

    fn open_port(&self, handle: Handle) -> Result<(PortId, Option<BdAddr>), JvError> {
        self.require_enabled()?;
        self.shared.table.read(|t| {
            let target = validator::check_open(t, handle)?;
            let record = t
                .session_record(target.slot, target.session)
                .ok_or(JvError::SessionInactive)?;
            let port = record.port.ok_or(JvError::SessionInactive)?;
            Ok((port, record.peer))
        })
    }

    fn exec_read(&mut self, handle: Handle, len: u16) -> Result<Payload, JvError> {
        let (port, _) = self.open_port(handle)?;
        let len = (len as usize).min(MAX_PAYLOAD);
        let mut buf = [0u8; MAX_PAYLOAD];
        let n = self.transport.read(port, &mut buf[..len]).map_err(|e| {
            warn!("read {handle} failed: {e}");
            JvError::UnderlyingFailure
        })?;
        let data = Payload::from_slice(&buf[..n.min(len)]).unwrap_or_default();

        let queued = self.transport.queued_byte_count(port).unwrap_or(0);
        self.shared.table.write(|t| {
            if let Some(r) = t.session_record_mut(handle.slot(), handle.session()) {
                r.rx_queued = queued;
            }
        });
        Ok(data)
    }

    fn exec_write(&mut self, handle: Handle, data: &[u8]) -> Result<usize, JvError> {
        let (port, peer) = self.open_port(handle)?;
        self.notify_power(handle, peer, ConnState::Busy);
        let written = self.transport.write(port, data).map_err(|e| {
            warn!("write {handle} failed: {e}");
            JvError::UnderlyingFailure
        });
        self.notify_power(handle, peer, ConnState::Idle);
        written
    }

    // ── Power profiles ────────────────────────────────────────

    fn exec_set_power_profile(
        &mut self,
        handle: Handle,
        policy: PmId,
        initial: ConnState,
    ) -> Result<(), JvError> {
        self.require_enabled()?;
        let peer = self.shared.table.read(|t| {
            let target = validator::check(t, handle, false)?;
            let session_peer = t
                .session_record(target.slot, target.session)
                .and_then(|r| r.peer);
            let slot_peer = t
                .slot(target.slot)
                .and_then(|s| s.profile())
                .and_then(|p| p.peer);
            Ok::<_, JvError>(session_peer.or(slot_peer))
        })?;

        if policy.is_clear() {
            if let Some(b) = self.profiles.remove(handle) {
                self.power.notify(b.policy, b.peer, ConnState::Close);
            }
            return Ok(());
        }
        self.profiles.set(PowerProfileBinding {
            handle,
            policy,
            state: initial,
            peer,
        })?;
        self.power.notify(policy, peer, initial);
        debug!("power profile {} bound to {handle}", policy.0);
        Ok(())
    }

    fn notify_power(&mut self, handle: Handle, peer: Option<BdAddr>, state: ConnState) {
        if let Some(b) = self.profiles.update_state(handle, state) {
            self.power.notify(b.policy, peer.or(b.peer), state);
        }
    }

    fn drop_profile(&mut self, handle: Handle) {
        if let Some(b) = self.profiles.remove(handle) {
            self.power.notify(b.policy, b.peer, ConnState::Close);
        }
    }

    fn drop_slot_profiles(&mut self, slot: usize) {
        for b in self.profiles.remove_slot(slot) {
            self.power.notify(b.policy, b.peer, ConnState::Close);
        }
    }

    // ── Transport notifications ───────────────────────────────

    fn exec_port_event(&mut self, port: PortId, event: PortEvent) {
        let located = self.shared.table.read(|t| {
            let (slot, session) = t.find_port(port)?;
            let record = t.session_record(slot, session)?;
            let profile = *t.slot(slot)?.profile()?;
            let callback = t.callback(slot)?;
            Some((Target { slot, session }, record.state, profile, callback))
        });
        let Some((target, state, profile, callback)) = located else {
            debug!("{:?} for unknown port {}", event, port.raw());
            return;
        };
        let handle = Handle::encode(target.slot, target.session);

        match (event, state) {
            (PortEvent::Connected { peer }, SessionState::Connecting | SessionState::Listening) => {
                self.shared.table.write(|t| {
                    if let Some(r) = t.session_record_mut(target.slot, target.session) {
                        r.state = SessionState::Open;
                        r.peer = Some(peer);
                    }
                });
                info!("{handle} open to {peer}");
                self.reply(
                    Some(&callback),
                    JvEvent::Opened {
                        handle,
                        status: Ok(()),
                        peer: Some(peer),
                        user_data: profile.user_data,
                    },
                );
                self.notify_power(handle, Some(peer), ConnState::Open);
                if state == SessionState::Listening {
                    self.ensure_listener(target.slot);
                }
            }
            (PortEvent::ConnectFailed | PortEvent::Disconnected, SessionState::Connecting) => {
                warn!("{handle} connect to {:?} failed", profile.peer);
                self.release_session(handle, target);
                self.reply(
                    Some(&callback),
                    JvEvent::Opened {
                        handle,
                        status: Err(JvError::UnderlyingFailure),
                        peer: profile.peer,
                        user_data: profile.user_data,
                    },
                );
            }
            (PortEvent::Disconnected, SessionState::Open) => {
                info!("{handle} closed by peer");
                self.release_session(handle, target);
                self.reply(
                    Some(&callback),
                    JvEvent::Closed {
                        handle,
                        status: Ok(()),
                        reason: CloseReason::Remote,
                        user_data: profile.user_data,
                    },
                );
                if profile.kind == SlotKind::Server && self.config.rearm_listener {
                    self.ensure_listener(target.slot);
                }
            }
            (PortEvent::ConnectFailed | PortEvent::Disconnected, SessionState::Listening) => {
                warn!("listener {handle} dropped by transport");
                self.release_session(handle, target);
                if self.config.rearm_listener {
                    self.ensure_listener(target.slot);
                }
            }
            (PortEvent::DataReady { queued }, _) => {
                self.shared.table.write(|t| {
                    if let Some(r) = t.session_record_mut(target.slot, target.session) {
                        r.rx_queued = queued;
                    }
                });
                self.reply(Some(&callback), JvEvent::DataAvailable { handle, queued });
            }
            (event, state) => debug!("{handle}: ignoring {:?} in {:?}", event, state),
        }
    }

    // ── Helpers ───────────────────────────────────────────────

    /// Attach `port` to a session that has none yet.  A port that cannot
    /// be attached is closed again.
    fn bind_port(&mut self, target: Target, port: PortId) {
        let bound = self.shared.table.write(|t| {
            match t.session_record_mut(target.slot, target.session) {
                Some(r) if r.port.is_none() => {
                    r.port = Some(port);
                    true
                }
                _ => false,
            }
        });
        if !bound {
            warn!("port {} has no free session to bind to", port.raw());
            self.transport.close(port);
        }
    }

    /// Release one session with its port and power binding.  Clears the
    /// slot's bindings too if the slot went with it.
    fn release_session(&mut self, handle: Handle, target: Target) {
        let release = self
            .shared
            .table
            .write(|t| t.release_session(target.slot, target.session));
        if let Some(port) = release.port {
            self.transport.close(port);
        }
        self.drop_profile(handle);
        if release.slot_released {
            self.drop_slot_profiles(target.slot);
        }
    }

    fn close_ports(&mut self, ports: &[PortId]) {
        for port in ports {
            self.transport.close(*port);
        }
    }

    /// Keep one listening session on a server slot while it is below its
    /// session cap.
    fn ensure_listener(&mut self, slot: usize) {
        let profile = self.shared.table.read(|t| {
            let s = t.slot(slot)?;
            let profile = *s.profile()?;
            let wanted = s.is_registered()
                && !s.is_tearing_down()
                && profile.kind == SlotKind::Server
                && t.count_in_state(slot, SessionState::Listening) == 0
                && s.live_sessions() < profile.max_sessions;
            wanted.then_some(profile)
        });
        let Some(profile) = profile else {
            return;
        };

        let session = match self
            .shared
            .table
            .write(|t| t.open_session(slot, SessionState::Listening))
        {
            Ok((session, _)) => session,
            Err(e) => {
                warn!("cannot re-arm server slot {slot}: {e}");
                return;
            }
        };
        let target = Target { slot, session };
        match self.transport.open(&listen_params(&profile)) {
            Ok(port) => {
                self.bind_port(target, port);
                debug!("server slot {slot} listening on session {session}");
            }
            Err(e) => {
                warn!("server slot {slot} re-arm failed: {e}");
                self.shared.table.write(|t| t.release_session(slot, session));
            }
        }
    }

    fn reply(&mut self, to: Option<&Callback>, event: JvEvent) {
        match to {
            Some(cb) => self.outbox.push((cb.clone(), event)),
            None => warn!("{} dropped: no callback", event.name()),
        }
    }

    fn flush(&mut self) {
        for (callback, event) in self.outbox.drain(..) {
            callback.emit(&event);
        }
    }
}

fn listen_params(profile: &SlotProfile) -> OpenParams {
    OpenParams {
        mode: OpenMode::Listen {
            local_scn: profile.scn,
        },
        sec_mask: profile.sec_mask,
        role: profile.role,
    }
}
