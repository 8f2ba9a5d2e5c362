//! Handle validation.
//!
//! Runs twice for every handle-addressed command: synchronously in the
//! caller's thread before the record is queued, and again on the
//! dispatcher right before execution, since the target may have changed in
//! between.  Both runs use the same functions against the same table.

use crate::error::JvError;
use crate::handle::{Handle, HandleKind, MAX_SESSIONS_PER_SLOT, MAX_SLOTS};
use crate::table::{ResourceTable, SessionState};

/// A validated `(slot, session)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub slot: usize,
    pub session: usize,
}

/// How live the addressed resource must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Registered slot only.
    Slot,
    /// Registered slot and a bound session entry.
    Session,
    /// As `Session`, and the session's port is open.
    OpenSession,
}

/// Decode and check `handle`.
///
/// 1. `InvalidHandle` if it is not an RFCOMM handle or decodes out of range.
/// 2. `SlotInactive` if the slot has no callback.
/// 3. With `requires_live_session`, `SessionInactive` if the session's
///    sub-handle is zero.
pub fn check(
    table: &ResourceTable,
    handle: Handle,
    requires_live_session: bool,
) -> Result<Target, JvError> {
    let (slot, session) = handle.decode();
    if handle.kind() != HandleKind::Rfcomm || slot >= MAX_SLOTS || session >= MAX_SESSIONS_PER_SLOT
    {
        return Err(JvError::InvalidHandle);
    }
    if !table.slot(slot).is_some_and(|s| s.is_registered()) {
        return Err(JvError::SlotInactive);
    }
    if requires_live_session && table.sub_handle(slot, session) == 0 {
        return Err(JvError::SessionInactive);
    }
    Ok(Target { slot, session })
}

/// [`check`] with a live session whose port is open.  Reads and writes
/// are only accepted against open sessions.
pub fn check_open(table: &ResourceTable, handle: Handle) -> Result<Target, JvError> {
    let target = check(table, handle, true)?;
    match table.session_record(target.slot, target.session) {
        Some(r) if r.state == SessionState::Open => Ok(target),
        _ => Err(JvError::SessionInactive),
    }
}

pub fn validate(
    table: &ResourceTable,
    handle: Handle,
    requirement: Requirement,
) -> Result<Target, JvError> {
    match requirement {
        Requirement::Slot => check(table, handle, false),
        Requirement::Session => check(table, handle, true),
        Requirement::OpenSession => check_open(table, handle),
    }
}
