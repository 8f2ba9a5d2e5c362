//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing every event as one structured log
//! line.  Useful as a management callback or while bringing up a transport.

use log::{info, warn};

use crate::app::events::JvEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`JvEvent`].
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&self, event: &JvEvent) {
        if let Err(e) = event.status() {
            warn!("EVENT | {} | handle={:?} | failed: {}", event.name(), event.handle(), e);
            return;
        }
        match event {
            JvEvent::Opened { handle, peer, .. } => {
                info!("OPEN  | {handle} | peer={:?}", peer);
            }
            JvEvent::Closed { handle, reason, .. } => {
                info!("CLOSE | {handle} | reason={:?}", reason);
            }
            JvEvent::ReadComplete {
                handle,
                req_id,
                data,
                ..
            } => {
                info!("READ  | {handle} | req={req_id} | {} bytes", data.len());
            }
            JvEvent::WriteComplete {
                handle,
                req_id,
                len,
                ..
            } => {
                info!("WRITE | {handle} | req={req_id} | {len} bytes");
            }
            JvEvent::DataAvailable { handle, queued } => {
                info!("RXQ   | {handle} | queued={queued}");
            }
            JvEvent::DiscoveryComplete { scn, user_data, .. } => {
                info!("SDP   | scn={:?} | user_data={user_data:#x}", scn);
            }
            other => info!("EVENT | {} | handle={:?}", other.name(), other.handle()),
        }
    }
}
