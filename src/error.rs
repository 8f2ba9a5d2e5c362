//! Unified error types for the JV port facade.
//!
//! A single `JvError` enum that every subsystem converts into, so the
//! synchronous submission path and the asynchronous event path report the
//! same vocabulary.  All variants are `Copy`: they travel inside events
//! that are cloned to callbacks on the dispatcher thread.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every rejected submission and every failed terminal event carries one of
/// these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JvError {
    /// No free slot, session, port record or queue capacity.
    Exhausted,
    /// Handle is malformed or decodes out of range, or names the wrong kind
    /// of slot for the operation.
    InvalidHandle,
    /// Handle is well-formed but its slot has no registered callback.
    SlotInactive,
    /// Slot is live but the addressed session is not (or not open).
    SessionInactive,
    /// The command record cannot hold the supplied arguments.
    AllocationFailure,
    /// The transport or discovery collaborator refused the operation.
    /// Only ever reported through an event.
    UnderlyingFailure,
    /// The service is not enabled.
    NotEnabled,
    /// `enable` called while the service is enabled or still disabling.
    AlreadyEnabled,
}

impl fmt::Display for JvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "resources exhausted"),
            Self::InvalidHandle => write!(f, "invalid handle"),
            Self::SlotInactive => write!(f, "slot inactive"),
            Self::SessionInactive => write!(f, "session inactive"),
            Self::AllocationFailure => write!(f, "command record allocation failed"),
            Self::UnderlyingFailure => write!(f, "underlying transport failure"),
            Self::NotEnabled => write!(f, "service not enabled"),
            Self::AlreadyEnabled => write!(f, "service already enabled"),
        }
    }
}

impl core::error::Error for JvError {}

// ---------------------------------------------------------------------------
// Resource table errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// Every connection slot (or port record) is occupied.
    Exhausted,
    /// The slot has no free session entry below its session cap.
    SlotFull,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "table exhausted"),
            Self::SlotFull => write!(f, "slot full"),
        }
    }
}

impl From<TableError> for JvError {
    fn from(_: TableError) -> Self {
        Self::Exhausted
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, JvError>;
