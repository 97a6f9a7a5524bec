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

//! Bond coordination.
//!
//! Brings a remote device to the bonded state before any socket is opened.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::device::{BondState, RemoteDevice};
use super::error::BondError;
use super::platform::BluetoothAdapter;

pub struct BondCoordinator {
    adapter: Arc<dyn BluetoothAdapter>,
}

impl BondCoordinator {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>) -> Self {
        Self { adapter }
    }

    /// Wait until `device` is bonded, the bond is dropped, or `timeout` elapses.
    ///
    /// Returns immediately for a device that is already bonded. The bond state
    /// subscription is released on every exit path, including when the
    /// returned future is dropped.
    pub async fn ensure_bonded(
        &self,
        device: &mut RemoteDevice,
        timeout: Duration,
    ) -> Result<(), BondError> {
        if device.is_bonded() {
            debug!("{} already bonded", device.address());
            return Ok(());
        }

        let address = device.address();

        // Subscribe before requesting so a fast completion is not missed.
        let mut events = self
            .adapter
            .bond_events()
            .subscribe(move |event| event.address == address);

        info!("Requesting bond with {}", address);
        self.adapter
            .create_bond(address)
            .await
            .map_err(|e| BondError::RequestFailed(e.to_string()))?;
        device.bond_state = BondState::Bonding;

        let wait = async {
            loop {
                match events.recv().await {
                    Some(event) => match event.state {
                        BondState::Bonded => return Ok(()),
                        BondState::NotBonded => return Err(BondError::Rejected),
                        BondState::Bonding => debug!("{} bonding in progress", address),
                    },
                    None => return Err(BondError::Rejected),
                }
            }
        };

        let result = match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(BondError::Timeout(timeout)),
        };

        events.unsubscribe();

        match &result {
            Ok(()) => {
                info!("Bonded with {}", address);
                device.bond_state = BondState::Bonded;
            }
            Err(e) => {
                warn!("Bonding with {} failed: {}", address, e);
                device.bond_state = BondState::NotBonded;
            }
        }
        result
    }
}
