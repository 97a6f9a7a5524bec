// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connection manager.
//!
//! Owns the current transport and drives the state machine
//!
//! ```text
//! Disconnected -> Bonding -> Connecting -> Connected -> Disconnected
//! ```
//!
//! Every established transport gets a generation number. The read loop,
//! the write consumer and their supervisor are bound to that generation, so
//! a late failure from a replaced transport can neither tear down its
//! successor nor report a second error.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bond::BondCoordinator;
use super::connector::SocketConnector;
use super::device::{BondState, DeviceAddress, RemoteDevice};
use super::error::{AdapterError, SppError};
use super::models::DeviceInfo;
use super::pipeline::{SendPipeline, WriteOutcome};
use super::platform::{BluetoothAdapter, ChannelSocketFactory};
use super::reader::{self, ReadOutcome};
use super::scanner::DeviceScanner;
use super::transport::Transport;
use crate::config::LinkConfig;
use crate::events::{Callback, DataListener, EventDispatcher};
use crate::state::{ConnectionState, LinkState};

struct Session {
    generation: u64,
    device: RemoteDevice,
    cancel: CancellationToken,
}

struct Inner {
    adapter: Arc<dyn BluetoothAdapter>,
    config: LinkConfig,
    scanner: DeviceScanner,
    bonds: BondCoordinator,
    connector: SocketConnector,
    link: LinkState,
    pipeline: SendPipeline,
    dispatcher: EventDispatcher,
    session: Mutex<Option<Session>>,
    generation: AtomicU64,
    connecting: AtomicBool,
    connect_cancel: Mutex<Option<CancellationToken>>,
    on_connected: Mutex<Option<Callback>>,
}

/// Public surface of the SPP link.
///
/// Cloning is cheap; all clones drive the same link. Must be created inside
/// a Tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        adapter: Arc<dyn BluetoothAdapter>,
        channels: Arc<dyn ChannelSocketFactory>,
        config: LinkConfig,
    ) -> Self {
        let inner = Inner {
            scanner: DeviceScanner::new(Arc::clone(&adapter)),
            bonds: BondCoordinator::new(Arc::clone(&adapter)),
            connector: SocketConnector::new(Arc::clone(&adapter), channels, config.clone()),
            pipeline: SendPipeline::new(config.chunk_size),
            link: LinkState::new(),
            dispatcher: EventDispatcher::new(),
            session: Mutex::new(None),
            generation: AtomicU64::new(0),
            connecting: AtomicBool::new(false),
            connect_cancel: Mutex::new(None),
            on_connected: Mutex::new(None),
            adapter,
            config,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Connect to the device at `address`.
    ///
    /// Any active scan is stopped and an existing link is torn down first.
    /// Payloads queued with [`send`](Self::send) while disconnected are
    /// written before anything submitted after the connect completes.
    pub async fn connect(&self, address: &str) -> Result<(), SppError> {
        let address: DeviceAddress = address.parse()?;
        let inner = &self.inner;

        inner.adapter.check_permissions()?;
        if !inner.adapter.is_available().await {
            return Err(SppError::AdapterUnavailable);
        }

        let _flight = FlightGuard::acquire(inner).ok_or(SppError::ConnectInProgress)?;
        let cancel = CancellationToken::new();
        *inner.connect_cancel.lock() = Some(cancel.clone());
        info!("Connecting to {}", address);

        inner.scanner.stop().await;

        let result = if cancel.is_cancelled() {
            Err(SppError::Cancelled)
        } else {
            inner.teardown(false);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SppError::Cancelled),
                result = with_deadline(inner.config.connect_timeout(), inner.establish(address)) => result,
            }
        };

        let outcome = result.and_then(|transport| Inner::install(inner, transport, &cancel));
        match &outcome {
            Ok(()) => info!("Connected to {}", address),
            Err(e) => {
                warn!("Connect to {} failed: {}", address, e);
                inner.link.set_disconnected();
            }
        }
        outcome
    }

    /// Queue a payload for the device. Never blocks.
    ///
    /// While disconnected the payload is buffered in memory until the next
    /// successful connect.
    pub fn send(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.inner.pipeline.send(bytes.into())
    }

    /// Tear down the link and cancel an in-flight connect. Idempotent.
    pub fn disconnect(&self) {
        if let Some(token) = self.inner.connect_cancel.lock().take() {
            info!("Cancelling in-flight connect");
            token.cancel();
        }
        self.inner.teardown(true);
    }

    /// Run `callback` once the link is up. Runs right away if already
    /// connected; otherwise replaces any stored callback.
    pub fn on_connected<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = self.inner.on_connected.lock();
        if self.inner.link.get_state() == ConnectionState::Connected {
            drop(slot);
            self.inner.dispatcher.post(Box::new(callback));
        } else {
            *slot = Some(Box::new(callback));
        }
    }

    pub fn set_data_listener(&self, listener: Arc<dyn DataListener>) {
        self.inner.dispatcher.set_listener(Some(listener));
    }

    pub fn clear_data_listener(&self) {
        self.inner.dispatcher.set_listener(None);
    }

    pub async fn start_scan(&self) -> Result<(), SppError> {
        if self.inner.connecting.load(Ordering::SeqCst) {
            return Err(SppError::ConnectInProgress);
        }
        self.inner.adapter.check_permissions()?;
        self.inner.scanner.start().await?;

        // A connect that began while discovery was starting already stopped
        // the scan; discovery must not outlive that.
        if self.inner.connecting.load(Ordering::SeqCst) {
            self.inner.scanner.stop().await;
            if self.inner.adapter.is_discovering().await {
                if let Err(e) = self.inner.adapter.cancel_discovery().await {
                    debug!("Ignoring cancel_discovery failure: {}", e);
                }
            }
            return Err(SppError::ConnectInProgress);
        }
        Ok(())
    }

    pub async fn stop_scan(&self) {
        self.inner.scanner.stop().await;
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.scanner.is_scanning()
    }

    pub fn get_scanned_devices(&self) -> Vec<DeviceInfo> {
        self.inner
            .scanner
            .devices()
            .iter()
            .map(DeviceInfo::from)
            .collect()
    }

    pub fn get_connected_device_info(&self) -> Option<DeviceInfo> {
        self.inner
            .link
            .get_connected_device()
            .as_ref()
            .map(DeviceInfo::from)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.link.get_state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.link.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

impl Inner {
    /// Bond, then walk the socket strategies.
    async fn establish(&self, address: DeviceAddress) -> Result<Transport, SppError> {
        self.link.set_state(ConnectionState::Bonding);

        let mut device = match self.adapter.remote_device(address).await {
            Ok(device) => device,
            Err(AdapterError::DeviceNotFound(_)) => {
                debug!("{} not known to the adapter yet", address);
                RemoteDevice::new(address, None, BondState::NotBonded)
            }
            Err(e) => return Err(e.into()),
        };

        self.bonds
            .ensure_bonded(&mut device, self.config.bond_timeout())
            .await?;

        self.link.set_state(ConnectionState::Connecting);
        let transport = self.connector.connect(&device).await?;
        Ok(transport)
    }

    /// Start the read loop and write consumer for a fresh transport.
    fn install(
        this: &Arc<Self>,
        transport: Transport,
        connect_token: &CancellationToken,
    ) -> Result<(), SppError> {
        let mut session = this.session.lock();
        if connect_token.is_cancelled() {
            return Err(SppError::Cancelled);
        }

        let generation = this.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let route = transport.route();
        let (device, read_half, write_half) = transport.into_split();
        let cancel = CancellationToken::new();

        let reader = reader::spawn(
            read_half,
            this.config.read_buffer_size,
            this.dispatcher.sink(generation),
            cancel.clone(),
        );
        let writer = this.pipeline.attach(write_half, cancel.clone());
        tokio::spawn(supervise(Arc::downgrade(this), generation, reader, writer));

        debug!(
            "Installed transport {} to {} via {}",
            generation,
            device.address(),
            route
        );
        *session = Some(Session {
            generation,
            device: device.clone(),
            cancel,
        });

        let callback = {
            let mut slot = this.on_connected.lock();
            this.link.set_connected(device);
            slot.take()
        };
        drop(session);

        if let Some(callback) = callback {
            this.dispatcher.post(callback);
        }
        Ok(())
    }

    /// End the session of `generation` after its read loop or write consumer
    /// stopped on its own. A no-op if that session is already gone.
    fn end_session(&self, generation: u64, error: Option<SppError>) {
        let session = {
            let mut current = self.session.lock();
            match current.as_ref() {
                Some(session) if session.generation == generation => current.take(),
                _ => None,
            }
        };
        let Some(session) = session else {
            return;
        };

        session.cancel.cancel();
        self.pipeline.detach();
        self.pipeline.clear_pending();

        match error {
            Some(error) => {
                warn!("Link to {} lost: {}", session.device.address(), error);
                self.dispatcher.sink(generation).error(error);
            }
            None => info!("Link to {} closed by remote", session.device.address()),
        }
        self.link.set_disconnected();
    }

    /// Drop the current transport. Undelivered notifications from it are
    /// discarded.
    fn teardown(&self, clear_pending: bool) {
        let session = self.session.lock().take();
        self.dispatcher
            .revoke_through(self.generation.load(Ordering::SeqCst));

        if let Some(session) = session {
            info!("Disconnecting from {}", session.device.address());
            session.cancel.cancel();
        }

        self.pipeline.detach();
        if clear_pending {
            self.pipeline.clear_pending();
        }
        self.link.set_disconnected();
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(token) = self.connect_cancel.get_mut().take() {
            token.cancel();
        }
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}

/// Single-flight marker for `connect`.
struct FlightGuard<'a> {
    inner: &'a Inner,
}

impl<'a> FlightGuard<'a> {
    fn acquire(inner: &'a Inner) -> Option<Self> {
        inner
            .connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { inner })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.connect_cancel.lock().take();
        // A connect future dropped mid-way leaves no half state behind.
        if matches!(
            self.inner.link.get_state(),
            ConnectionState::Bonding | ConnectionState::Connecting
        ) {
            self.inner.link.set_disconnected();
        }
        self.inner.connecting.store(false, Ordering::Release);
    }
}

async fn with_deadline<F>(deadline: Option<Duration>, attempt: F) -> Result<Transport, SppError>
where
    F: Future<Output = Result<Transport, SppError>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .unwrap_or(Err(SppError::ConnectTimeout(limit))),
        None => attempt.await,
    }
}

enum LinkEnd {
    TornDown,
    Lost(Option<SppError>),
}

async fn supervise(
    inner: Weak<Inner>,
    generation: u64,
    mut reader: tokio::task::JoinHandle<ReadOutcome>,
    mut writer: tokio::task::JoinHandle<WriteOutcome>,
) {
    let end = tokio::select! {
        outcome = &mut reader => read_end(outcome),
        outcome = &mut writer => write_end(outcome),
    };

    let LinkEnd::Lost(error) = end else {
        return;
    };
    if let Some(inner) = inner.upgrade() {
        inner.end_session(generation, error);
    }
}

fn read_end(outcome: Result<ReadOutcome, JoinError>) -> LinkEnd {
    match outcome {
        Ok(ReadOutcome::Cancelled) => LinkEnd::TornDown,
        Ok(ReadOutcome::Eof) => LinkEnd::Lost(None),
        Ok(ReadOutcome::Failed(e)) => LinkEnd::Lost(Some(SppError::Io(e))),
        Err(e) => LinkEnd::Lost(Some(SppError::Platform(format!("read task ended: {e}")))),
    }
}

fn write_end(outcome: Result<WriteOutcome, JoinError>) -> LinkEnd {
    match outcome {
        Ok(WriteOutcome::Cancelled) | Ok(WriteOutcome::Closed) => LinkEnd::TornDown,
        Ok(WriteOutcome::Failed(e)) => LinkEnd::Lost(Some(SppError::Io(e))),
        Err(e) => LinkEnd::Lost(Some(SppError::Platform(format!("write task ended: {e}")))),
    }
}
