//! Power-profile bindings.
//!
//! Associates a connection handle with a power-management policy and the
//! connection state it was registered in.  At most one binding per handle.
//! Owned by the dispatcher: bindings are removed when the bound session or
//! its slot goes away, so none outlive their handle.

use heapless::Vec;

use crate::error::JvError;
use crate::handle::Handle;
use crate::types::{BdAddr, ConnState, PmId};

/// Hard capacity of the binding table.
pub const PM_MAX_BINDINGS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerProfileBinding {
    pub handle: Handle,
    pub policy: PmId,
    pub state: ConnState,
    /// Peer of the bound session, when known at bind time.
    pub peer: Option<BdAddr>,
}

pub struct PowerProfiles {
    bindings: Vec<PowerProfileBinding, PM_MAX_BINDINGS>,
    limit: usize,
}

impl PowerProfiles {
    /// `limit` is clamped to `[1, PM_MAX_BINDINGS]`.
    pub fn new(limit: usize) -> Self {
        Self {
            bindings: Vec::new(),
            limit: limit.clamp(1, PM_MAX_BINDINGS),
        }
    }

    /// Insert or replace the binding for `binding.handle`.  Returns the
    /// replaced binding, if any.
    pub fn set(
        &mut self,
        binding: PowerProfileBinding,
    ) -> Result<Option<PowerProfileBinding>, JvError> {
        if let Some(existing) = self.bindings.iter_mut().find(|b| b.handle == binding.handle) {
            return Ok(Some(core::mem::replace(existing, binding)));
        }
        if self.bindings.len() >= self.limit {
            return Err(JvError::Exhausted);
        }
        self.bindings
            .push(binding)
            .map_err(|_| JvError::Exhausted)?;
        Ok(None)
    }

    pub fn get(&self, handle: Handle) -> Option<&PowerProfileBinding> {
        self.bindings.iter().find(|b| b.handle == handle)
    }

    /// Record a new connection state for a bound handle.  Returns the
    /// binding when one exists.
    pub fn update_state(&mut self, handle: Handle, state: ConnState) -> Option<PowerProfileBinding> {
        let b = self.bindings.iter_mut().find(|b| b.handle == handle)?;
        b.state = state;
        Some(*b)
    }

    pub fn remove(&mut self, handle: Handle) -> Option<PowerProfileBinding> {
        let index = self.bindings.iter().position(|b| b.handle == handle)?;
        Some(self.bindings.swap_remove(index))
    }

    /// Remove every binding whose handle addresses `slot`.
    pub fn remove_slot(&mut self, slot: usize) -> Vec<PowerProfileBinding, PM_MAX_BINDINGS> {
        let mut removed = Vec::new();
        let mut i = 0;
        while i < self.bindings.len() {
            if self.bindings[i].handle.slot() == slot {
                // Never exceeds the table's own capacity.
                let _ = removed.push(self.bindings.swap_remove(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    pub fn clear_all(&mut self) {
        self.bindings.clear();
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
