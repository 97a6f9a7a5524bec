//! Fake Bluetooth stack for driving the connection manager in tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use uuid::Uuid;

use spp_link::bluetooth::{
    AdapterError, BluetoothAdapter, BondEvent, BondState, BoxedIo, ChannelSocketFactory,
    DeviceAddress, DiscoveryEvent, EventBus, RemoteDevice, SocketSecurity,
};
use spp_link::{ConnectionManager, ConnectionState, LinkConfig};

pub const WATCH: &str = "00:11:22:33:44:55";

/// Adapter and channel calls, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RemoteDevice,
    CreateBond,
    StartDiscovery,
    CancelDiscovery,
    FetchUuids,
    ServiceUuids,
    ConnectService(Uuid, SocketSecurity),
    ConnectChannel(u8, SocketSecurity),
}

/// How the fake answers a bond request.
#[derive(Debug, Clone, Copy)]
pub enum BondPlan {
    Succeed { after: Duration },
    Reject { after: Duration },
    Never,
    FailRequest,
}

/// How the fake answers a socket connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPlan {
    Accept,
    /// Connects, but every write fails.
    AcceptBroken,
    Refuse,
    Hang,
}

struct AdapterState {
    available: bool,
    known: bool,
    name: Option<String>,
    bond_state: BondState,
    bond_plan: BondPlan,
    uuids: Vec<Uuid>,
    sdp_fails: bool,
    service_plan: SocketPlan,
    discovering: bool,
    start_discovery_delay: Duration,
    cancel_discovery_delay: Duration,
}

type CallLog = Arc<Mutex<Vec<Call>>>;

pub struct FakeAdapter {
    state: Arc<Mutex<AdapterState>>,
    calls: CallLog,
    remotes: mpsc::UnboundedSender<DuplexStream>,
    pub bond_bus: EventBus<BondEvent>,
    pub discovery_bus: EventBus<DiscoveryEvent>,
}

impl FakeAdapter {
    pub fn set_bond_state(&self, state: BondState) {
        self.state.lock().bond_state = state;
    }

    pub fn set_bond_plan(&self, plan: BondPlan) {
        self.state.lock().bond_plan = plan;
    }

    pub fn set_uuids(&self, uuids: Vec<Uuid>) {
        self.state.lock().uuids = uuids;
    }

    pub fn set_service_plan(&self, plan: SocketPlan) {
        self.state.lock().service_plan = plan;
    }

    pub fn set_sdp_fails(&self, fails: bool) {
        self.state.lock().sdp_fails = fails;
    }

    pub fn set_name(&self, name: &str) {
        self.state.lock().name = Some(name.to_string());
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    pub fn set_known(&self, known: bool) {
        self.state.lock().known = known;
    }

    /// Discovery only reports as running once the delay has passed.
    pub fn set_start_discovery_delay(&self, delay: Duration) {
        self.state.lock().start_discovery_delay = delay;
    }

    pub fn set_cancel_discovery_delay(&self, delay: Duration) {
        self.state.lock().cancel_discovery_delay = delay;
    }

    pub fn discovering(&self) -> bool {
        self.state.lock().discovering
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl BluetoothAdapter for FakeAdapter {
    async fn is_available(&self) -> bool {
        self.state.lock().available
    }

    async fn remote_device(&self, address: DeviceAddress) -> Result<RemoteDevice, AdapterError> {
        self.record(Call::RemoteDevice);
        let state = self.state.lock();
        if !state.known {
            return Err(AdapterError::DeviceNotFound(address.to_string()));
        }
        Ok(RemoteDevice::new(address, state.name.clone(), state.bond_state))
    }

    async fn create_bond(&self, address: DeviceAddress) -> Result<(), AdapterError> {
        self.record(Call::CreateBond);
        let plan = self.state.lock().bond_plan;

        let (after, outcome) = match plan {
            BondPlan::FailRequest => {
                return Err(AdapterError::Platform("createBond returned false".into()))
            }
            BondPlan::Never => return Ok(()),
            BondPlan::Succeed { after } => (after, BondState::Bonded),
            BondPlan::Reject { after } => (after, BondState::NotBonded),
        };

        let bus = self.bond_bus.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            bus.publish(BondEvent {
                address,
                state: BondState::Bonding,
            });
            tokio::time::sleep(after).await;
            state.lock().bond_state = outcome;
            bus.publish(BondEvent {
                address,
                state: outcome,
            });
        });
        Ok(())
    }

    fn bond_events(&self) -> &EventBus<BondEvent> {
        &self.bond_bus
    }

    async fn start_discovery(&self) -> Result<(), AdapterError> {
        self.record(Call::StartDiscovery);
        let delay = self.state.lock().start_discovery_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().discovering = true;
        Ok(())
    }

    async fn cancel_discovery(&self) -> Result<(), AdapterError> {
        self.record(Call::CancelDiscovery);
        let delay = self.state.lock().cancel_discovery_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().discovering = false;
        Ok(())
    }

    async fn is_discovering(&self) -> bool {
        self.state.lock().discovering
    }

    fn discovery_events(&self) -> &EventBus<DiscoveryEvent> {
        &self.discovery_bus
    }

    async fn fetch_uuids_with_sdp(&self, _address: DeviceAddress) -> Result<(), AdapterError> {
        self.record(Call::FetchUuids);
        if self.state.lock().sdp_fails {
            return Err(AdapterError::Platform("fetchUuidsWithSdp returned false".into()));
        }
        Ok(())
    }

    async fn service_uuids(&self, _address: DeviceAddress) -> Result<Vec<Uuid>, AdapterError> {
        self.record(Call::ServiceUuids);
        Ok(self.state.lock().uuids.clone())
    }

    async fn connect_service(
        &self,
        _address: DeviceAddress,
        uuid: Uuid,
        security: SocketSecurity,
    ) -> io::Result<BoxedIo> {
        self.record(Call::ConnectService(uuid, security));
        let plan = self.state.lock().service_plan;
        open_socket(plan, &self.remotes).await
    }
}

pub struct FakeChannels {
    plans: Mutex<Vec<(u8, SocketPlan)>>,
    calls: CallLog,
    remotes: mpsc::UnboundedSender<DuplexStream>,
}

impl FakeChannels {
    /// Channels without a plan refuse.
    pub fn set_plan(&self, channel: u8, plan: SocketPlan) {
        let mut plans = self.plans.lock();
        plans.retain(|(ch, _)| *ch != channel);
        plans.push((channel, plan));
    }
}

#[async_trait]
impl ChannelSocketFactory for FakeChannels {
    async fn connect_channel(
        &self,
        _address: DeviceAddress,
        channel: u8,
        security: SocketSecurity,
    ) -> io::Result<BoxedIo> {
        self.calls.lock().push(Call::ConnectChannel(channel, security));
        let plan = self
            .plans
            .lock()
            .iter()
            .find(|(ch, _)| *ch == channel)
            .map(|(_, plan)| *plan)
            .unwrap_or(SocketPlan::Refuse);
        open_socket(plan, &self.remotes).await
    }
}

async fn open_socket(
    plan: SocketPlan,
    remotes: &mpsc::UnboundedSender<DuplexStream>,
) -> io::Result<BoxedIo> {
    match plan {
        SocketPlan::Accept => {
            let (local, remote) = tokio::io::duplex(64 * 1024);
            let _ = remotes.send(remote);
            Ok(Box::new(local))
        }
        SocketPlan::AcceptBroken => Ok(Box::new(BrokenSocket)),
        SocketPlan::Refuse => Err(io::ErrorKind::ConnectionRefused.into()),
        SocketPlan::Hang => std::future::pending().await,
    }
}

/// Never yields inbound data; every write fails.
pub struct BrokenSocket;

impl AsyncRead for BrokenSocket {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

impl AsyncWrite for BrokenSocket {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

pub struct Harness {
    pub adapter: Arc<FakeAdapter>,
    pub channels: Arc<FakeChannels>,
    pub manager: ConnectionManager,
    /// Device side of every accepted socket, in connect order.
    pub remotes: mpsc::UnboundedReceiver<DuplexStream>,
    calls: CallLog,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(LinkConfig::default())
    }

    /// Bonded, known device; every socket refuses until a plan says otherwise.
    pub fn with_config(config: LinkConfig) -> Self {
        let (remote_tx, remotes) = mpsc::unbounded_channel();
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));

        let adapter = Arc::new(FakeAdapter {
            state: Arc::new(Mutex::new(AdapterState {
                available: true,
                known: true,
                name: None,
                bond_state: BondState::Bonded,
                bond_plan: BondPlan::Succeed {
                    after: Duration::from_millis(10),
                },
                uuids: Vec::new(),
                sdp_fails: false,
                service_plan: SocketPlan::Refuse,
                discovering: false,
                start_discovery_delay: Duration::ZERO,
                cancel_discovery_delay: Duration::ZERO,
            })),
            calls: Arc::clone(&calls),
            remotes: remote_tx.clone(),
            bond_bus: EventBus::new(),
            discovery_bus: EventBus::new(),
        });
        let channels = Arc::new(FakeChannels {
            plans: Mutex::new(Vec::new()),
            calls: Arc::clone(&calls),
            remotes: remote_tx,
        });

        let manager = ConnectionManager::new(adapter.clone(), channels.clone(), config);

        Self {
            adapter,
            channels,
            manager,
            remotes,
            calls,
        }
    }

    /// Every adapter and channel call so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn socket_attempts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::ConnectChannel(..) | Call::ConnectService(..)))
            .count()
    }

    pub async fn next_remote(&mut self) -> DuplexStream {
        tokio::time::timeout(Duration::from_secs(5), self.remotes.recv())
            .await
            .expect("no socket accepted")
            .expect("socket source closed")
    }
}

pub async fn wait_for_state(manager: &ConnectionManager, target: ConnectionState) {
    let mut rx = manager.subscribe_state();
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if *rx.borrow_and_update() == target {
                return;
            }
            rx.changed().await.expect("state channel closed");
        }
    })
    .await
    .expect("state not reached");
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
