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

//! Link state management.

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::bluetooth::RemoteDevice;

/// Connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Bonding,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Bonding => "Bonding...",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Connected",
        }
    }
}

/// Shared link state.
#[derive(Debug)]
pub struct LinkState {
    state: watch::Sender<ConnectionState>,

    /// Device behind the current transport.
    connected_device: RwLock<Option<RemoteDevice>>,
}

impl Default for LinkState {
    fn default() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            connected_device: RwLock::new(None),
        }
    }
}

impl LinkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observers are only woken by actual transitions.
    pub fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    pub fn set_connected(&self, device: RemoteDevice) {
        *self.connected_device.write() = Some(device);
        self.set_state(ConnectionState::Connected);
    }

    pub fn set_disconnected(&self) {
        *self.connected_device.write() = None;
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn get_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn get_connected_device(&self) -> Option<RemoteDevice> {
        self.connected_device.read().clone()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}
