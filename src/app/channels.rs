//! State shared between caller threads and the dispatcher.
//!
//! Uses an `embassy-sync` bounded channel for the command queue and a
//! blocking critical-section mutex for the resource table.  Callers only
//! ever reserve slots under the mutex; everything else the table holds is
//! mutated by the dispatcher.
//!
//! ```text
//! ┌──────────────┐ PendingCommand ┌──────────────┐
//! │ caller thread│──────────────▶│  Dispatcher  │──▶ Transport
//! │   (JvApi)    │   (FIFO, 32)   │              │
//! └──────┬───────┘                └──────┬───────┘
//!        │ reserve / read      mutate    │
//!        └──────────▶ SharedTable ◀──────┘
//!                          ▲
//!  Transport ──PortNotifier┘ (via the queue)
//! ```

use core::cell::RefCell;
use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;

use crate::table::ResourceTable;
use crate::types::PortId;

use super::commands::{Command, PendingCommand, PortEvent};
use super::ports::{Callback, SecurityQuery};

/// Command queue depth.  A full queue rejects submissions with `Exhausted`.
pub const QUEUE_DEPTH: usize = 32;

// ───────────────────────────────────────────────────────────────
// Command queue
// ───────────────────────────────────────────────────────────────

/// FIFO from any number of submitters to the single dispatcher.
pub struct CommandQueue {
    channel: Channel<CriticalSectionRawMutex, PendingCommand, QUEUE_DEPTH>,
}

impl CommandQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Enqueue without blocking.  Hands the record back when full.
    pub fn submit(&self, pending: PendingCommand) -> Result<(), PendingCommand> {
        self.channel.try_send(pending).map_err(|e| match e {
            embassy_sync::channel::TrySendError::Full(p) => p,
        })
    }

    pub fn try_next(&self) -> Option<PendingCommand> {
        self.channel.try_receive().ok()
    }

    /// Wait for the next record.
    pub async fn next(&self) -> PendingCommand {
        self.channel.receive().await
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Resource table
// ───────────────────────────────────────────────────────────────

/// The resource table behind a critical-section mutex.
pub struct SharedTable {
    inner: Mutex<CriticalSectionRawMutex, RefCell<ResourceTable>>,
}

impl SharedTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(ResourceTable::new())),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&ResourceTable) -> R) -> R {
        self.inner.lock(|t| f(&t.borrow()))
    }

    /// Closures passed here must not call back into the table or into any
    /// collaborator.
    pub fn write<R>(&self, f: impl FnOnce(&mut ResourceTable) -> R) -> R {
        self.inner.lock(|t| f(&mut t.borrow_mut()))
    }
}

impl Default for SharedTable {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Service lifecycle
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceState {
    Disabled = 0,
    Enabled = 1,
    /// `disable` accepted, teardown not yet executed.
    Disabling = 2,
}

pub struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub const fn new() -> Self {
        Self(AtomicU8::new(ServiceState::Disabled as u8))
    }

    pub fn get(&self) -> ServiceState {
        match self.0.load(Ordering::Acquire) {
            1 => ServiceState::Enabled,
            2 => ServiceState::Disabling,
            _ => ServiceState::Disabled,
        }
    }

    pub fn set(&self, state: ServiceState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Atomically move `from` → `to`.  Returns false if the current state
    /// was not `from`.
    pub fn transition(&self, from: ServiceState, to: ServiceState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Shared
// ───────────────────────────────────────────────────────────────

pub struct Shared {
    pub queue: CommandQueue,
    pub table: SharedTable,
    pub lifecycle: Lifecycle,
    /// Callback given to `enable`; receives management events.
    management: Mutex<CriticalSectionRawMutex, RefCell<Option<Callback>>>,
    pub security: Arc<dyn SecurityQuery>,
}

impl Shared {
    pub fn new(security: Arc<dyn SecurityQuery>) -> Self {
        Self {
            queue: CommandQueue::new(),
            table: SharedTable::new(),
            lifecycle: Lifecycle::new(),
            management: Mutex::new(RefCell::new(None)),
            security,
        }
    }

    pub fn management(&self) -> Option<Callback> {
        self.management.lock(|m| m.borrow().clone())
    }

    pub fn set_management(&self, callback: Option<Callback>) {
        self.management.lock(|m| *m.borrow_mut() = callback);
    }
}

// ───────────────────────────────────────────────────────────────
// Transport → dispatcher
// ───────────────────────────────────────────────────────────────

/// Handle given to the transport for reporting port activity.  Each call
/// queues a `Port` command behind whatever was already submitted.
#[derive(Clone)]
pub struct PortNotifier {
    shared: Arc<Shared>,
}

impl PortNotifier {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Returns false if the queue was full and the notification dropped.
    pub fn notify(&self, port: PortId, event: PortEvent) -> bool {
        let pending = PendingCommand::internal(Command::Port { port, event });
        if self.shared.queue.submit(pending).is_err() {
            warn!("queue full, dropped {:?} for port {}", event, port.raw());
            return false;
        }
        true
    }
}
