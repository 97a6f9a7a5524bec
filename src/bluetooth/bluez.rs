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

//! BlueZ backend.
//!
//! Implements the platform seams on top of `bluer`. Direct channel sockets
//! are plain RFCOMM sockets; UUID sockets go through a client profile
//! registered with BlueZ so that the SDP lookup happens in the daemon.

use async_trait::async_trait;
use bluer::rfcomm::{Profile, ReqError, Role, Security, SecurityLevel, Socket, SocketAddr};
use bluer::{
    AdapterEvent, Address, DeviceEvent, DeviceProperty, DiscoveryFilter, DiscoveryTransport,
    Session,
};
use futures::StreamExt;
use parking_lot::Mutex;
use std::io;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bus::EventBus;
use super::device::{BondState, DeviceAddress, RemoteDevice};
use super::error::AdapterError;
use super::platform::{
    BluetoothAdapter, BondEvent, BoxedIo, ChannelSocketFactory, DiscoveryEvent, SocketSecurity,
};

impl From<bluer::Error> for AdapterError {
    fn from(err: bluer::Error) -> Self {
        match err.kind {
            bluer::ErrorKind::NotAuthorized | bluer::ErrorKind::NotPermitted => {
                AdapterError::PermissionDenied(err.message)
            }
            bluer::ErrorKind::DoesNotExist => AdapterError::DeviceNotFound(err.message),
            bluer::ErrorKind::NotReady => AdapterError::Unavailable,
            _ => AdapterError::Platform(err.to_string()),
        }
    }
}

fn to_bluer(address: DeviceAddress) -> Address {
    Address::new(address.octets())
}

fn from_bluer(address: Address) -> DeviceAddress {
    DeviceAddress::new(address.0)
}

fn io_error(err: bluer::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

/// Bluetooth Classic adapter backed by BlueZ.
pub struct BluezAdapter {
    session: Session,
    adapter: bluer::Adapter,
    bond_bus: EventBus<BondEvent>,
    discovery_bus: EventBus<DiscoveryEvent>,
    discovery: Mutex<Option<JoinHandle<()>>>,
}

impl BluezAdapter {
    /// Open a BlueZ session on the named adapter, or the default one.
    pub async fn new(adapter_name: Option<&str>) -> Result<Self, AdapterError> {
        let session = Session::new().await?;
        info!("BlueZ session created");

        let adapter = match adapter_name {
            Some(name) => session.adapter(name)?,
            None => session.default_adapter().await?,
        };
        info!("Using Bluetooth adapter: {}", adapter.name());

        if !adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            adapter.set_powered(true).await?;
        }

        let filter = DiscoveryFilter {
            transport: DiscoveryTransport::BrEdr,
            ..Default::default()
        };
        if let Err(e) = adapter.set_discovery_filter(filter).await {
            warn!("Failed to restrict discovery to BR/EDR: {}", e);
        }

        Ok(Self {
            session,
            adapter,
            bond_bus: EventBus::new(),
            discovery_bus: EventBus::new(),
            discovery: Mutex::new(None),
        })
    }

    async fn drive_discovery(
        adapter: bluer::Adapter,
        events: impl futures::Stream<Item = AdapterEvent>,
        bus: EventBus<DiscoveryEvent>,
    ) {
        futures::pin_mut!(events);

        while let Some(event) = events.next().await {
            match event {
                AdapterEvent::DeviceAdded(addr) => {
                    let Ok(device) = adapter.device(addr) else {
                        continue;
                    };
                    let name = device.name().await.ok().flatten();
                    let bond_state = match device.is_paired().await {
                        Ok(true) => BondState::Bonded,
                        _ => BondState::NotBonded,
                    };
                    bus.publish(DiscoveryEvent::DeviceFound(RemoteDevice::discovered(
                        from_bluer(addr),
                        name,
                        bond_state,
                    )));
                }
                AdapterEvent::DeviceRemoved(addr) => {
                    bus.publish(DiscoveryEvent::DeviceLost(from_bluer(addr)));
                }
                _ => {}
            }
        }
        debug!("Discovery stream ended");
    }

    async fn drive_bond(device: bluer::Device, bus: EventBus<BondEvent>, address: DeviceAddress) {
        let publish = |state| {
            bus.publish(BondEvent { address, state });
        };
        publish(BondState::Bonding);

        let changes = match device.events().await {
            Ok(changes) => Some(changes),
            Err(e) => {
                debug!("No property events for {}: {}", address, e);
                None
            }
        };
        let changes = futures::stream::iter(changes).flatten();
        futures::pin_mut!(changes);

        let pair = device.pair();
        futures::pin_mut!(pair);

        loop {
            tokio::select! {
                result = &mut pair => {
                    match result {
                        Ok(()) => publish(BondState::Bonded),
                        Err(e) if matches!(e.kind, bluer::ErrorKind::AlreadyExists) => {
                            publish(BondState::Bonded)
                        }
                        Err(e) => {
                            warn!("Pairing with {} failed: {}", address, e);
                            publish(BondState::NotBonded);
                        }
                    }
                    return;
                }
                Some(event) = changes.next() => {
                    if let DeviceEvent::PropertyChanged(DeviceProperty::Paired(true)) = event {
                        publish(BondState::Bonded);
                        return;
                    }
                }
            }
        }
    }

    async fn connect_profile(
        &self,
        address: DeviceAddress,
        uuid: Uuid,
        security: SocketSecurity,
    ) -> io::Result<BoxedIo> {
        let profile = Profile {
            uuid,
            role: Some(Role::Client),
            require_authentication: Some(security == SocketSecurity::Secure),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        let mut requests = self
            .session
            .register_profile(profile)
            .await
            .map_err(io_error)?;

        let addr = to_bluer(address);
        let device = self.adapter.device(addr).map_err(io_error)?;
        let connect = device.connect_profile(&uuid);
        futures::pin_mut!(connect);
        let mut connected = false;

        loop {
            tokio::select! {
                request = requests.next() => {
                    let Some(request) = request else {
                        return Err(io::Error::new(
                            io::ErrorKind::ConnectionAborted,
                            "profile unregistered",
                        ));
                    };
                    if request.device() != addr {
                        request.reject(ReqError::Rejected);
                        continue;
                    }
                    let stream = request.accept()?;
                    return Ok(Box::new(stream));
                }
                result = &mut connect, if !connected => {
                    result.map_err(io_error)?;
                    connected = true;
                }
            }
        }
    }
}

#[async_trait]
impl BluetoothAdapter for BluezAdapter {
    async fn is_available(&self) -> bool {
        self.adapter.is_powered().await.unwrap_or(false)
    }

    async fn remote_device(&self, address: DeviceAddress) -> Result<RemoteDevice, AdapterError> {
        let device = self.adapter.device(to_bluer(address))?;
        let bond_state = if device.is_paired().await? {
            BondState::Bonded
        } else {
            BondState::NotBonded
        };
        let name = device.name().await.ok().flatten();
        Ok(RemoteDevice::new(address, name, bond_state))
    }

    async fn create_bond(&self, address: DeviceAddress) -> Result<(), AdapterError> {
        let device = self.adapter.device(to_bluer(address))?;
        info!("Pairing with {}", address);
        tokio::spawn(Self::drive_bond(device, self.bond_bus.clone(), address));
        Ok(())
    }

    fn bond_events(&self) -> &EventBus<BondEvent> {
        &self.bond_bus
    }

    async fn start_discovery(&self) -> Result<(), AdapterError> {
        let events = self.adapter.discover_devices().await?;
        let task = tokio::spawn(Self::drive_discovery(
            self.adapter.clone(),
            events,
            self.discovery_bus.clone(),
        ));
        if let Some(previous) = self.discovery.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn cancel_discovery(&self) -> Result<(), AdapterError> {
        // Dropping the event stream ends the discovery session.
        if let Some(task) = self.discovery.lock().take() {
            task.abort();
        }
        Ok(())
    }

    async fn is_discovering(&self) -> bool {
        self.discovery
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn discovery_events(&self) -> &EventBus<DiscoveryEvent> {
        &self.discovery_bus
    }

    async fn fetch_uuids_with_sdp(&self, address: DeviceAddress) -> Result<(), AdapterError> {
        // BlueZ resolves services on its own; only check the device exists.
        let device = self.adapter.device(to_bluer(address))?;
        let resolved = device.is_services_resolved().await?;
        debug!("Services of {} resolved: {}", address, resolved);
        Ok(())
    }

    async fn service_uuids(&self, address: DeviceAddress) -> Result<Vec<Uuid>, AdapterError> {
        let device = self.adapter.device(to_bluer(address))?;
        let mut uuids: Vec<Uuid> = device.uuids().await?.unwrap_or_default().into_iter().collect();
        uuids.sort();
        Ok(uuids)
    }

    async fn connect_service(
        &self,
        address: DeviceAddress,
        uuid: Uuid,
        security: SocketSecurity,
    ) -> io::Result<BoxedIo> {
        self.connect_profile(address, uuid, security).await
    }
}

/// Direct RFCOMM channel sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct BluezChannels;

#[async_trait]
impl ChannelSocketFactory for BluezChannels {
    async fn connect_channel(
        &self,
        address: DeviceAddress,
        channel: u8,
        security: SocketSecurity,
    ) -> io::Result<BoxedIo> {
        let level = match security {
            SocketSecurity::Insecure => SecurityLevel::Low,
            SocketSecurity::Secure => SecurityLevel::Medium,
        };

        let socket = Socket::new()?;
        socket.set_security(Security {
            level,
            key_size: 0,
        })?;
        let stream = socket
            .connect(SocketAddr::new(to_bluer(address), channel))
            .await?;
        Ok(Box::new(stream))
    }
}
