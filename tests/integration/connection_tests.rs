//! Client connections, servers and handle reservation.

use jvport::app::channels::QUEUE_DEPTH;
use jvport::app::commands::PortEvent;
use jvport::app::events::{CloseReason, JvEvent};
use jvport::app::ports::OpenMode;
use jvport::handle::{Handle, MAX_SESSIONS_PER_SLOT, MAX_SLOTS};
use jvport::types::{BdAddr, ConnState, INVALID_PORT, PmId, PortId};
use jvport::JvError;

use crate::mock_stack::{
    Harness, PEER, Recorder, TransportCall, client_params, server_params,
};

const OTHER: BdAddr = BdAddr([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);

// ── Clients ───────────────────────────────────────────────────

#[test]
fn connect_returns_handle_and_opens() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    let handle = h.api.connect(client_params(), rec.callback(), 42).unwrap();
    assert_eq!(handle.raw(), 0x81);
    // Reserved but no port yet.
    assert_eq!(h.api.get_port_handle(handle), None);

    h.run();
    let TransportCall::Open(params) = h.transport.calls()[0] else {
        panic!("expected open");
    };
    assert_eq!(
        params.mode,
        OpenMode::Connect {
            peer: PEER,
            remote_scn: 3
        }
    );
    let port = h.api.get_port_handle(handle).unwrap();
    assert!(rec.events().is_empty());

    h.notify(port, PortEvent::Connected { peer: PEER });
    assert_eq!(
        rec.events(),
        vec![JvEvent::Opened {
            handle,
            status: Ok(()),
            peer: Some(PEER),
            user_data: 42,
        }]
    );
}

#[test]
fn close_before_open_yields_single_cancelled_event() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    let handle = h.api.connect(client_params(), rec.callback(), 1).unwrap();
    h.api.close(handle, 2).unwrap();
    h.run();

    assert_eq!(
        rec.events(),
        vec![JvEvent::Closed {
            handle,
            status: Ok(()),
            reason: CloseReason::Cancelled,
            user_data: 2,
        }]
    );
    assert_eq!(h.transport.closed(), vec![PortId(1)]);

    // A late completion for the cancelled port changes nothing.
    h.notify(PortId(1), PortEvent::Connected { peer: PEER });
    assert_eq!(rec.events().len(), 1);
}

#[test]
fn failed_connect_reports_and_frees_slot() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    let handle = h.api.connect(client_params(), rec.callback(), 0).unwrap();
    h.run();
    let port = h.api.get_port_handle(handle).unwrap();
    h.notify(port, PortEvent::ConnectFailed);

    assert_eq!(
        rec.events(),
        vec![JvEvent::Opened {
            handle,
            status: Err(JvError::UnderlyingFailure),
            peer: Some(PEER),
            user_data: 0,
        }]
    );
    assert_eq!(h.api.close(handle, 0), Err(JvError::SlotInactive));
}

#[test]
fn transport_open_failure_resolves_connect() {
    let mut h = Harness::enabled();
    h.transport.state.lock().unwrap().fail_open = true;
    let rec = Recorder::default();
    let handle = h.api.connect(client_params(), rec.callback(), 0).unwrap();
    h.run();
    assert_eq!(rec.events()[0].status(), Err(JvError::UnderlyingFailure));
    assert_eq!(h.api.ready(handle), Err(JvError::SlotInactive));
}

#[test]
fn remote_disconnect_closes_session() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    let (handle, port) = h.open_client(&rec, 9);
    rec.take();

    h.notify(port, PortEvent::Disconnected);
    assert_eq!(
        rec.events(),
        vec![JvEvent::Closed {
            handle,
            status: Ok(()),
            reason: CloseReason::Remote,
            user_data: 9,
        }]
    );
    assert_eq!(h.api.get_port_handle(handle), None);
}

#[test]
fn stale_close_fails_through_the_event() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    let (handle, port) = h.open_client(&rec, 0);
    rec.take();

    // Accepted while the session is still live...
    h.api.close(handle, 5).unwrap();
    // ...but the peer drops it first.
    assert!(h.notifier.notify(port, PortEvent::Disconnected));
    h.run();

    // close was queued first, so it wins and the notification finds nothing.
    assert_eq!(rec.names(), vec!["closed"]);
    assert_eq!(
        rec.events()[0],
        JvEvent::Closed {
            handle,
            status: Ok(()),
            reason: CloseReason::Local,
            user_data: 5,
        }
    );

    h.api.connect(client_params(), rec.callback(), 0).unwrap();
    h.api.close(handle, 6).unwrap();
    h.api.close(handle, 7).unwrap();
    h.run();
    let events = rec.events();
    assert_eq!(events[1].status(), Ok(()));
    assert_eq!(
        events[2],
        JvEvent::Closed {
            handle,
            status: Err(JvError::SlotInactive),
            reason: CloseReason::Local,
            user_data: 7,
        }
    );
}

#[test]
fn port_handle_of_invalid_handle_is_none() {
    let h = Harness::enabled();
    let handle = Handle::from_raw(0xdead_0000);
    assert_eq!(h.api.get_port_handle(handle), None);
    assert_eq!(h.api.get_port_handle_raw(handle), INVALID_PORT);
}

// ── Servers ───────────────────────────────────────────────────

#[test]
fn server_start_listens_on_local_channel() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    let handle = h.start_server(&rec, 2);
    assert_eq!(
        rec.events(),
        vec![JvEvent::ServerStarted {
            handle,
            status: Ok(()),
            user_data: 0,
        }]
    );
    let TransportCall::Open(params) = h.transport.calls()[0] else {
        panic!("expected open");
    };
    assert_eq!(params.mode, OpenMode::Listen { local_scn: 5 });
}

#[test]
fn slots_exhaust_without_events() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    for _ in 0..MAX_SLOTS {
        h.api.start_server(server_params(1), rec.callback(), 0).unwrap();
    }
    assert_eq!(
        h.api.start_server(server_params(1), rec.callback(), 0),
        Err(JvError::Exhausted)
    );
    h.run();
    assert_eq!(rec.events().len(), MAX_SLOTS);
    assert!(rec.events().iter().all(|e| e.status().is_ok()));
}

#[test]
fn full_queue_rolls_back_reservation() {
    let h = Harness::enabled();
    let rec = Recorder::default();
    for i in 0..QUEUE_DEPTH {
        h.api.create_record(i as u64).unwrap();
    }
    assert_eq!(
        h.api.connect(client_params(), rec.callback(), 0),
        Err(JvError::Exhausted)
    );
    // The slot reserved for the rejected connect is free again.
    assert_eq!(h.api.close(Handle::encode(0, 0), 0), Err(JvError::SlotInactive));
}

#[test]
fn accepted_session_rearms_listener() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    let server = h.start_server(&rec, 2);
    rec.take();
    let listen = h.api.get_port_handle(server).unwrap();

    h.notify(listen, PortEvent::Connected { peer: PEER });
    let first = Handle::encode(server.slot(), 0);
    assert_eq!(
        rec.events(),
        vec![JvEvent::Opened {
            handle: first,
            status: Ok(()),
            peer: Some(PEER),
            user_data: 0,
        }]
    );
    assert_eq!(h.transport.opens(), 2);

    let second = Handle::encode(server.slot(), 1);
    let next = h.api.get_port_handle(second).unwrap();
    h.notify(next, PortEvent::Connected { peer: OTHER });
    // At the cap: no third listener.
    assert_eq!(h.transport.opens(), 2);
    assert_eq!(rec.events()[1].handle(), Some(second));

    // Remote close of the first frees a session and re-arms.
    h.notify(listen, PortEvent::Disconnected);
    assert_eq!(rec.names(), vec!["opened", "opened", "closed"]);
    assert_eq!(h.transport.opens(), 3);
    assert!(h.api.get_port_handle(first).is_some());
}

#[test]
fn rearm_after_close_can_be_disabled() {
    let mut h = Harness::enabled_with(jvport::JvConfig {
        rearm_listener: false,
        ..Default::default()
    });
    let rec = Recorder::default();
    let server = h.start_server(&rec, 1);
    let port = h.api.get_port_handle(server).unwrap();
    h.notify(port, PortEvent::Connected { peer: PEER });
    h.notify(port, PortEvent::Disconnected);
    assert_eq!(h.transport.opens(), 1);
}

#[test]
fn session_cap_is_clamped() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    let server = h.start_server(&rec, 200);
    let mut port = h.api.get_port_handle(server).unwrap();
    for session in 0..MAX_SESSIONS_PER_SLOT {
        h.notify(port, PortEvent::Connected { peer: PEER });
        if session + 1 < MAX_SESSIONS_PER_SLOT {
            port = h
                .api
                .get_port_handle(Handle::encode(server.slot(), session + 1))
                .unwrap();
        }
    }
    assert_eq!(h.transport.opens(), MAX_SESSIONS_PER_SLOT);

    let mut h = Harness::enabled();
    let server = h.start_server(&rec, 0);
    let port = h.api.get_port_handle(server).unwrap();
    h.notify(port, PortEvent::Connected { peer: PEER });
    assert_eq!(h.transport.opens(), 1);
}

#[test]
fn stop_server_closes_everything() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    let server = h.start_server(&rec, 3);
    let listen = h.api.get_port_handle(server).unwrap();
    h.notify(listen, PortEvent::Connected { peer: PEER });
    rec.take();

    h.api.stop_server(server, 11).unwrap();
    h.run();
    assert_eq!(
        rec.events(),
        vec![JvEvent::ServerStopped {
            handle: server,
            status: Ok(()),
            user_data: 11,
        }]
    );
    let mut closed = h.transport.closed();
    closed.sort_by_key(|p| p.raw());
    assert_eq!(closed, vec![PortId(1), PortId(2)]);
    assert_eq!(h.api.stop_server(server, 0), Err(JvError::SlotInactive));
}

#[test]
fn stop_server_on_client_is_invalid() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    let (handle, _) = h.open_client(&rec, 0);
    assert_eq!(h.api.stop_server(handle, 0), Err(JvError::InvalidHandle));
}

#[test]
fn closing_listener_does_not_rearm() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    let server = h.start_server(&rec, 2);
    rec.take();
    h.api.close(server, 0).unwrap();
    h.run();
    assert_eq!(rec.events()[0].status(), Ok(()));
    assert_eq!(h.transport.opens(), 1);
    // The slot itself stays registered until stop_server.
    assert!(h.api.stop_server(server, 0).is_ok());
}

// ── Malformed handles ─────────────────────────────────────────

#[test]
fn malformed_handles_are_never_queued() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    h.open_client(&rec, 0);
    rec.take();
    let queued = h.api.pending_commands();

    for handle in [
        Handle::from_raw(0),
        Handle::encode(MAX_SLOTS, 0),
        Handle::encode(0, MAX_SESSIONS_PER_SLOT),
    ] {
        assert_eq!(h.api.close(handle, 0), Err(JvError::InvalidHandle));
        assert_eq!(h.api.stop_server(handle, 0), Err(JvError::InvalidHandle));
        assert_eq!(h.api.read(handle, 1, 16), Err(JvError::InvalidHandle));
        assert_eq!(h.api.write(handle, 2, b"x"), Err(JvError::InvalidHandle));
        assert_eq!(
            h.api.set_power_profile(handle, PmId(1), ConnState::Open),
            Err(JvError::InvalidHandle)
        );
        assert_eq!(h.api.ready(handle), Err(JvError::InvalidHandle));
        assert_eq!(h.api.get_port_handle_raw(handle), INVALID_PORT);
        assert_eq!(h.api.pending_commands(), queued);
    }

    assert_eq!(h.run(), 0);
    assert!(rec.events().is_empty());
    assert!(h.mgmt.events().is_empty());
}

#[test]
fn raw_port_handle_matches_bound_port() {
    let mut h = Harness::enabled();
    let rec = Recorder::default();
    let (handle, port) = h.open_client(&rec, 0);
    assert_eq!(h.api.get_port_handle_raw(handle), port.raw());

    h.api.close(handle, 0).unwrap();
    h.run();
    assert_eq!(h.api.get_port_handle_raw(handle), INVALID_PORT);
}
