//! Fuzz target: handle decoding and validation.
//!
//! Builds a small table from the first bytes, then validates every
//! following 4-byte word as a raw handle.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - A handle that validates always decodes in bounds
//! - A handle that validates with a live session has a port record
//!
//! cargo fuzz run fuzz_handle_validate

#![no_main]

use std::sync::Arc;

use jvport::app::events::JvEvent;
use jvport::app::ports::Callback;
use jvport::handle::Handle;
use jvport::table::{ResourceTable, SessionState, SlotKind, SlotProfile, clamp_sessions};
use jvport::types::{LinkRole, SecMask};
use jvport::validator;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&setup, rest)) = data.split_first() else {
        return;
    };

    let mut table = ResourceTable::new();
    let cb: Callback = Arc::new(|_: &JvEvent| {});
    // Low nibble: slots to register; high nibble: sessions per slot.
    for _ in 0..(setup & 0x0f) {
        let Ok(slot) = table.allocate_slot(
            cb.clone(),
            SlotProfile {
                kind: SlotKind::Server,
                sec_mask: SecMask::NONE,
                role: LinkRole::Slave,
                scn: 1,
                peer: None,
                max_sessions: clamp_sessions(setup >> 4),
                user_data: 0,
            },
        ) else {
            break;
        };
        for _ in 0..(setup >> 4) {
            let _ = table.open_session(slot, SessionState::Open);
        }
    }

    for word in rest.chunks_exact(4) {
        let raw = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        let h = Handle::from_raw(raw);
        if let Ok(target) = validator::check(&table, h, false) {
            assert!(h.in_bounds());
            assert_eq!((target.slot, target.session), h.decode());
        }
        if let Ok(target) = validator::check(&table, h, true) {
            assert!(table.session_record(target.slot, target.session).is_some());
        }
        let _ = validator::check_open(&table, h);
    }
});
