//! Recording mock stack for integration tests.
//!
//! Every collaborator logs its calls into shared state so tests can assert
//! on the full history after the mocks have been moved into the
//! dispatcher.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use jvport::app::api::JvApi;
use jvport::app::channels::PortNotifier;
use jvport::app::commands::PortEvent;
use jvport::app::dispatcher::Dispatcher;
use jvport::app::events::JvEvent;
use jvport::app::ports::{
    Callback, EventSink, OpenParams, PowerPolicy, SecurityQuery, ServiceDiscovery, Transport,
};
use jvport::config::JvConfig;
use jvport::handle::Handle;
use jvport::types::{
    BdAddr, ConnState, LinkRole, PmId, PortId, RecordHandle, Scn, SecMask, ServiceUuid,
};
use jvport::{ConnectParams, ServerParams, Stack, build};

pub const PEER: BdAddr = BdAddr([0x00, 0x1a, 0x7d, 0xda, 0x71, 0x13]);

// ── Transport ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Open(OpenParams),
    Close(PortId),
    Read { port: PortId, len: usize },
    Write { port: PortId, data: Vec<u8> },
}

#[derive(Default)]
pub struct TransportState {
    pub calls: Vec<TransportCall>,
    next_port: u16,
    pub fail_open: bool,
    pub fail_write: bool,
    pub rx: HashMap<PortId, VecDeque<u8>>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    pub state: Arc<Mutex<TransportState>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn opens(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, TransportCall::Open(_)))
            .count()
    }

    pub fn closed(&self) -> Vec<PortId> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                TransportCall::Close(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                TransportCall::Write { data, .. } => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn push_rx(&self, port: PortId, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .rx
            .entry(port)
            .or_default()
            .extend(bytes.iter().copied());
    }
}

impl Transport for MockTransport {
    fn open(&mut self, params: &OpenParams) -> anyhow::Result<PortId> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(TransportCall::Open(*params));
        if s.fail_open {
            anyhow::bail!("no free port");
        }
        s.next_port += 1;
        Ok(PortId(s.next_port))
    }

    fn close(&mut self, port: PortId) {
        self.state.lock().unwrap().calls.push(TransportCall::Close(port));
    }

    fn read(&mut self, port: PortId, buf: &mut [u8]) -> anyhow::Result<usize> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(TransportCall::Read {
            port,
            len: buf.len(),
        });
        let queue = s.rx.entry(port).or_default();
        let n = buf.len().min(queue.len());
        for (dst, src) in buf.iter_mut().zip(queue.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, port: PortId, data: &[u8]) -> anyhow::Result<usize> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(TransportCall::Write {
            port,
            data: data.to_vec(),
        });
        if s.fail_write {
            anyhow::bail!("link dropped");
        }
        Ok(data.len())
    }

    fn queued_byte_count(&self, port: PortId) -> anyhow::Result<u32> {
        let s = self.state.lock().unwrap();
        Ok(s.rx.get(&port).map_or(0, |q| q.len() as u32))
    }
}

// ── Discovery ─────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockDiscovery {
    pub scn: Option<Scn>,
    pub records: Arc<Mutex<Vec<RecordHandle>>>,
    pub queries: Arc<Mutex<Vec<(BdAddr, Vec<ServiceUuid>)>>>,
}

impl ServiceDiscovery for MockDiscovery {
    fn discover(&mut self, peer: BdAddr, uuids: &[ServiceUuid]) -> anyhow::Result<Option<Scn>> {
        self.queries.lock().unwrap().push((peer, uuids.to_vec()));
        Ok(self.scn)
    }

    fn create_record(&mut self) -> anyhow::Result<RecordHandle> {
        let mut records = self.records.lock().unwrap();
        let record = 0x0001_0000 + records.len() as u32;
        records.push(record);
        Ok(record)
    }

    fn delete_record(&mut self, record: RecordHandle) -> anyhow::Result<()> {
        let mut records = self.records.lock().unwrap();
        let Some(i) = records.iter().position(|r| *r == record) else {
            anyhow::bail!("unknown record {record:#x}");
        };
        records.remove(i);
        Ok(())
    }
}

// ── Power policy ──────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockPower {
    pub log: Arc<Mutex<Vec<(PmId, Option<BdAddr>, ConnState)>>>,
}

#[allow(dead_code)]
impl MockPower {
    pub fn states(&self) -> Vec<ConnState> {
        self.log.lock().unwrap().iter().map(|(_, _, s)| *s).collect()
    }
}

impl PowerPolicy for MockPower {
    fn notify(&mut self, policy: PmId, peer: Option<BdAddr>, state: ConnState) {
        self.log.lock().unwrap().push((policy, peer, state));
    }
}

// ── Security ──────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockSecurity {
    pub encrypted: Arc<Mutex<HashSet<BdAddr>>>,
}

impl SecurityQuery for MockSecurity {
    fn is_link_encrypted(&self, peer: BdAddr) -> bool {
        self.encrypted.lock().unwrap().contains(&peer)
    }
}

// ── Event recorder ────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<JvEvent>>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn callback(&self) -> Callback {
        Arc::new(self.clone())
    }

    pub fn events(&self) -> Vec<JvEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<JvEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(JvEvent::name).collect()
    }

    pub fn last(&self) -> Option<JvEvent> {
        self.events().last().cloned()
    }
}

impl EventSink for Recorder {
    fn emit(&self, event: &JvEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── Harness ───────────────────────────────────────────────────

pub struct Harness {
    pub api: JvApi,
    pub dispatcher: Dispatcher,
    pub transport: MockTransport,
    pub discovery: MockDiscovery,
    pub power: MockPower,
    pub security: MockSecurity,
    pub mgmt: Recorder,
    pub notifier: PortNotifier,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_config(JvConfig::default())
    }

    pub fn with_config(config: JvConfig) -> Self {
        let transport = MockTransport::default();
        let discovery = MockDiscovery {
            scn: Some(3),
            ..Default::default()
        };
        let power = MockPower::default();
        let security = MockSecurity::default();
        let stack = Stack::new(transport.clone())
            .with_discovery(discovery.clone())
            .with_power(power.clone())
            .with_security(security.clone());
        let (api, dispatcher) = build(config, stack).unwrap();
        let notifier = api.port_notifier();
        Self {
            api,
            dispatcher,
            transport,
            discovery,
            power,
            security,
            mgmt: Recorder::default(),
            notifier,
        }
    }

    /// Harness with the service already enabled and `Enabled` consumed.
    pub fn enabled() -> Self {
        Self::enabled_with(JvConfig::default())
    }

    pub fn enabled_with(config: JvConfig) -> Self {
        let mut h = Self::with_config(config);
        h.api.enable(h.mgmt.callback()).unwrap();
        h.run();
        h.mgmt.take();
        h
    }

    pub fn run(&mut self) -> usize {
        self.dispatcher.process_pending()
    }

    pub fn notify(&mut self, port: PortId, event: PortEvent) {
        assert!(self.notifier.notify(port, event));
        self.run();
    }

    /// Connect to [`PEER`] and drive it to `Opened`.  Returns the handle and
    /// its port.
    pub fn open_client(&mut self, events: &Recorder, user_data: u64) -> (Handle, PortId) {
        let handle = self
            .api
            .connect(client_params(), events.callback(), user_data)
            .unwrap();
        self.run();
        let port = self.api.get_port_handle(handle).unwrap();
        self.notify(port, PortEvent::Connected { peer: PEER });
        (handle, port)
    }

    pub fn start_server(&mut self, events: &Recorder, max_sessions: u8) -> Handle {
        let handle = self
            .api
            .start_server(server_params(max_sessions), events.callback(), 0)
            .unwrap();
        self.run();
        handle
    }
}

pub fn client_params() -> ConnectParams {
    ConnectParams {
        sec_mask: SecMask::AUTHENTICATE.union(SecMask::ENCRYPT),
        role: LinkRole::Master,
        remote_scn: 3,
        peer: PEER,
    }
}

pub fn server_params(max_sessions: u8) -> ServerParams {
    ServerParams {
        sec_mask: SecMask::NONE,
        role: LinkRole::Slave,
        local_scn: 5,
        max_sessions,
    }
}
