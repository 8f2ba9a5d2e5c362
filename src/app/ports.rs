//! Port traits — the boundary between the command core and its
//! collaborators.
//!
//! ```text
//!   caller ──▶ JvApi ──▶ queue ──▶ Dispatcher ──▶ Transport / ServiceDiscovery
//!                │                     │           PowerPolicy
//!                ▼                     ▼
//!          SecurityQuery          EventSink (per-slot callbacks)
//! ```
//!
//! Everything that touches the radio stack sits behind these traits, so the
//! core runs against recording mocks on the host.  The dispatcher is the
//! only caller of [`Transport`], [`ServiceDiscovery`] and [`PowerPolicy`];
//! [`SecurityQuery`] is consulted directly from caller threads.

use std::sync::Arc;

use crate::types::{
    BdAddr, ConnState, LinkRole, PmId, PortId, RecordHandle, Scn, SecMask, ServiceUuid,
};

use super::events::JvEvent;

// ───────────────────────────────────────────────────────────────
// Event sink (domain → caller)
// ───────────────────────────────────────────────────────────────

/// Receives the asynchronous events of one registration.  Invoked only from
/// the dispatcher, never while the resource table is locked.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &JvEvent);
}

impl<F> EventSink for F
where
    F: Fn(&JvEvent) + Send + Sync,
{
    fn emit(&self, event: &JvEvent) {
        self(event);
    }
}

/// Registered callback, shared between the caller and the table.
pub type Callback = Arc<dyn EventSink>;

// ───────────────────────────────────────────────────────────────
// Transport (domain → radio stack)
// ───────────────────────────────────────────────────────────────

/// What an opened port should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Initiate a connection to `peer` on `remote_scn`.
    Connect { peer: BdAddr, remote_scn: Scn },
    /// Listen for one incoming connection on `local_scn`.
    Listen { local_scn: Scn },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenParams {
    pub mode: OpenMode,
    pub sec_mask: SecMask,
    pub role: LinkRole,
}

/// Byte-stream port provider.
///
/// `open` returns as soon as the port exists; completion of the connection
/// is reported later through a [`PortNotifier`](super::channels::PortNotifier).
pub trait Transport: Send {
    fn open(&mut self, params: &OpenParams) -> anyhow::Result<PortId>;

    fn close(&mut self, port: PortId);

    /// Read up to `buf.len()` bytes.  Returns the number read.
    fn read(&mut self, port: PortId, buf: &mut [u8]) -> anyhow::Result<usize>;

    /// Returns the number of bytes accepted.
    fn write(&mut self, port: PortId, data: &[u8]) -> anyhow::Result<usize>;

    /// Bytes waiting to be read on `port`.
    fn queued_byte_count(&self, port: PortId) -> anyhow::Result<u32>;
}

// ───────────────────────────────────────────────────────────────
// Service records / discovery
// ───────────────────────────────────────────────────────────────

pub trait ServiceDiscovery: Send {
    /// Search `peer` for a service matching `uuids`.  Returns the RFCOMM
    /// channel of the first match, if any.
    fn discover(&mut self, peer: BdAddr, uuids: &[ServiceUuid]) -> anyhow::Result<Option<Scn>>;

    fn create_record(&mut self) -> anyhow::Result<RecordHandle>;

    fn delete_record(&mut self, record: RecordHandle) -> anyhow::Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Security query (called from caller threads)
// ───────────────────────────────────────────────────────────────

pub trait SecurityQuery: Send + Sync {
    fn is_link_encrypted(&self, peer: BdAddr) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Power policy
// ───────────────────────────────────────────────────────────────

/// Receives connection-state changes for handles bound to a power profile.
pub trait PowerPolicy: Send {
    fn notify(&mut self, policy: PmId, peer: Option<BdAddr>, state: ConnState);
}

// ───────────────────────────────────────────────────────────────
// Null collaborators
// ───────────────────────────────────────────────────────────────

/// Discovery backend with no records and no peers.
pub struct NullDiscovery;

impl ServiceDiscovery for NullDiscovery {
    fn discover(&mut self, _peer: BdAddr, _uuids: &[ServiceUuid]) -> anyhow::Result<Option<Scn>> {
        Ok(None)
    }

    fn create_record(&mut self) -> anyhow::Result<RecordHandle> {
        anyhow::bail!("no service record database")
    }

    fn delete_record(&mut self, _record: RecordHandle) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Reports every link as unencrypted.
pub struct NoSecurity;

impl SecurityQuery for NoSecurity {
    fn is_link_encrypted(&self, _peer: BdAddr) -> bool {
        false
    }
}

/// Ignores power-state changes.
pub struct NullPowerPolicy;

impl PowerPolicy for NullPowerPolicy {
    fn notify(&mut self, _policy: PmId, _peer: Option<BdAddr>, _state: ConnState) {}
}
