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

//! Bluetooth communication module.
//!
//! Bluetooth Classic SPP client: bonding, socket strategies and the ordered
//! byte stream on top of an RFCOMM transport.

pub mod bond;
pub mod bus;
pub mod connector;
pub mod constants;
pub mod device;
pub mod error;
pub mod manager;
pub mod models;
pub mod pipeline;
pub mod platform;
pub mod reader;
pub mod scanner;
pub mod transport;

#[cfg(feature = "bluez")]
pub mod bluez;

pub use bond::BondCoordinator;
pub use bus::{EventBus, Subscription};
pub use connector::SocketConnector;
pub use constants::{SPP_UUID, SPP_UUID_PREFIX};
pub use device::{BondState, DeviceAddress, RemoteDevice};
pub use error::{AdapterError, BondError, ConnectError, SppError};
pub use manager::ConnectionManager;
pub use models::{ConnectResult, DeviceInfo};
pub use pipeline::{SendPipeline, WriteOutcome};
pub use platform::{
    BluetoothAdapter, BondEvent, BoxedIo, ChannelSocketFactory, DiscoveryEvent, RfcommIo,
    SocketSecurity, UnsupportedChannels,
};
pub use reader::ReadOutcome;
pub use scanner::DeviceScanner;
pub use transport::{ConnectRoute, Transport};

#[cfg(feature = "bluez")]
pub use bluez::{BluezAdapter, BluezChannels};
