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

//! Platform seams for the Bluetooth stack.
//!
//! The connection manager never talks to a Bluetooth stack directly. It is
//! handed a [`BluetoothAdapter`] (discovery, bonding, SDP and UUID sockets)
//! and a [`ChannelSocketFactory`] (direct RFCOMM channel sockets, which not
//! every stack exposes).

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use super::bus::EventBus;
use super::device::{BondState, DeviceAddress, RemoteDevice};
use super::error::AdapterError;

/// A connected RFCOMM byte stream.
pub trait RfcommIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> RfcommIo for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Boxed RFCOMM stream handed out by the platform.
pub type BoxedIo = Box<dyn RfcommIo>;

/// Link security requested for a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketSecurity {
    /// No authentication or encryption required.
    Insecure,
    /// Authenticated, encrypted link.
    Secure,
}

impl SocketSecurity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocketSecurity::Insecure => "insecure",
            SocketSecurity::Secure => "secure",
        }
    }
}

/// Bond state change for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondEvent {
    pub address: DeviceAddress,
    pub state: BondState,
}

/// Discovery notification.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    DeviceFound(RemoteDevice),
    DeviceLost(DeviceAddress),
}

/// Bluetooth Classic adapter operations used by the link.
#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    /// Check runtime permissions needed to connect.
    fn check_permissions(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Whether the adapter is present and powered.
    async fn is_available(&self) -> bool;

    /// Resolve a device record, including its current bond state.
    async fn remote_device(&self, address: DeviceAddress) -> Result<RemoteDevice, AdapterError>;

    /// Start bonding. Returns once the request is issued, not once it completes.
    async fn create_bond(&self, address: DeviceAddress) -> Result<(), AdapterError>;

    /// Bond state notifications for all devices.
    fn bond_events(&self) -> &EventBus<BondEvent>;

    async fn start_discovery(&self) -> Result<(), AdapterError>;

    async fn cancel_discovery(&self) -> Result<(), AdapterError>;

    async fn is_discovering(&self) -> bool;

    /// Discovery notifications, published while discovery runs.
    fn discovery_events(&self) -> &EventBus<DiscoveryEvent>;

    /// Ask the stack to refresh the device's SDP records.
    async fn fetch_uuids_with_sdp(&self, address: DeviceAddress) -> Result<(), AdapterError>;

    /// Service UUIDs currently known for the device. May lag behind a fetch.
    async fn service_uuids(&self, address: DeviceAddress) -> Result<Vec<Uuid>, AdapterError>;

    /// Open an RFCOMM socket to the service record identified by `uuid`.
    async fn connect_service(
        &self,
        address: DeviceAddress,
        uuid: Uuid,
        security: SocketSecurity,
    ) -> io::Result<BoxedIo>;
}

/// Direct RFCOMM channel sockets.
///
/// Connecting by channel number bypasses SDP and is not available on every
/// stack. Stacks without it use [`UnsupportedChannels`], and the connector
/// falls back to service discovery alone.
#[async_trait]
pub trait ChannelSocketFactory: Send + Sync {
    fn is_supported(&self) -> bool {
        true
    }

    async fn connect_channel(
        &self,
        address: DeviceAddress,
        channel: u8,
        security: SocketSecurity,
    ) -> io::Result<BoxedIo>;
}

/// Channel factory for stacks without direct channel access.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedChannels;

#[async_trait]
impl ChannelSocketFactory for UnsupportedChannels {
    fn is_supported(&self) -> bool {
        false
    }

    async fn connect_channel(
        &self,
        _address: DeviceAddress,
        channel: u8,
        _security: SocketSecurity,
    ) -> io::Result<BoxedIo> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("direct RFCOMM channel {channel} not supported on this stack"),
        ))
    }
}
