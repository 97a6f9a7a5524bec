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

//! Device discovery.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::bus::Subscription;
use super::device::RemoteDevice;
use super::error::AdapterError;
use super::platform::{BluetoothAdapter, DiscoveryEvent};

#[derive(Default)]
struct ScanState {
    /// Found devices in discovery order, unique by address.
    devices: Vec<RemoteDevice>,
    collector: Option<JoinHandle<()>>,
}

/// Collects discovery results into a deduplicated device list.
pub struct DeviceScanner {
    adapter: Arc<dyn BluetoothAdapter>,
    state: Arc<Mutex<ScanState>>,
}

impl DeviceScanner {
    pub fn new(adapter: Arc<dyn BluetoothAdapter>) -> Self {
        Self {
            adapter,
            state: Arc::new(Mutex::new(ScanState::default())),
        }
    }

    /// Start a fresh scan. Results from a previous scan are discarded.
    pub async fn start(&self) -> Result<(), AdapterError> {
        self.stop().await;

        let events = self.adapter.discovery_events().subscribe(|_| true);
        {
            let mut state = self.state.lock();
            state.devices.clear();
            state.collector = Some(tokio::spawn(collect(events, Arc::clone(&self.state))));
        }

        if let Err(e) = self.adapter.start_discovery().await {
            if let Some(collector) = self.state.lock().collector.take() {
                collector.abort();
            }
            return Err(e);
        }

        info!("Bluetooth scan started");
        Ok(())
    }

    /// Stop the current scan, if any. Found devices stay queryable.
    pub async fn stop(&self) {
        let collector = self.state.lock().collector.take();
        let Some(collector) = collector else {
            return;
        };
        collector.abort();
        let _ = collector.await;

        if let Err(e) = self.adapter.cancel_discovery().await {
            debug!("Ignoring cancel_discovery failure: {}", e);
        }
        info!("Bluetooth scan stopped");
    }

    pub fn is_scanning(&self) -> bool {
        self.state
            .lock()
            .collector
            .as_ref()
            .is_some_and(|collector| !collector.is_finished())
    }

    pub fn devices(&self) -> Vec<RemoteDevice> {
        self.state.lock().devices.clone()
    }
}

async fn collect(mut events: Subscription<DiscoveryEvent>, state: Arc<Mutex<ScanState>>) {
    while let Some(event) = events.recv().await {
        let mut guard = state.lock();
        match event {
            DiscoveryEvent::DeviceFound(device) => {
                match guard
                    .devices
                    .iter_mut()
                    .find(|known| known.address() == device.address())
                {
                    Some(known) => {
                        if known.name().is_none() && device.name().is_some() {
                            *known = device;
                        }
                    }
                    None => {
                        info!(
                            "Found device: {} ({})",
                            device.address(),
                            device.name().unwrap_or("N/A")
                        );
                        guard.devices.push(device);
                    }
                }
            }
            DiscoveryEvent::DeviceLost(address) => {
                debug!("Device lost: {}", address);
                guard.devices.retain(|known| known.address() != address);
            }
        }
    }
}
