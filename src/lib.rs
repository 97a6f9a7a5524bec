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

//! Bluetooth Classic Serial Port Profile link.
//!
//! Turns an RFCOMM connection to a wearable into an ordered byte stream:
//! bonding, layered channel/UUID connect strategies, a buffered write
//! pipeline and a read loop, driven by [`ConnectionManager`].

pub mod bluetooth;
pub mod config;
pub mod events;
pub mod state;

pub use bluetooth::{ConnectResult, ConnectionManager, DeviceInfo, SppError};
pub use config::{Config, LinkConfig};
pub use events::{ChannelListener, DataListener, LinkEvent};
pub use state::ConnectionState;
