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

//! Socket strategy sequence.
//!
//! RFCOMM channel numbers and SDP record visibility differ between Bluetooth
//! stacks, so a connect walks an ordered list of strategies and keeps the
//! first socket that comes up:
//!
//! 1. each configured direct channel (insecure, then secure), bounded by the
//!    channel's own timeout,
//! 2. SDP: refresh the service records, then poll the UUID list for SPP
//!    entries and try each (insecure, then secure), each socket bounded by
//!    the SDP connect timeout.
//!
//! A socket abandoned on timeout is dropped, which closes it.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::constants::uuid_has_prefix;
use super::device::RemoteDevice;
use super::error::ConnectError;
use super::platform::{BluetoothAdapter, BoxedIo, ChannelSocketFactory, SocketSecurity};
use super::transport::{ConnectRoute, Transport};
use crate::config::{ChannelAttempt, LinkConfig};

const SECURITY_ORDER: [SocketSecurity; 2] = [SocketSecurity::Insecure, SocketSecurity::Secure];

pub struct SocketConnector {
    adapter: Arc<dyn BluetoothAdapter>,
    channels: Arc<dyn ChannelSocketFactory>,
    config: LinkConfig,
}

impl SocketConnector {
    pub fn new(
        adapter: Arc<dyn BluetoothAdapter>,
        channels: Arc<dyn ChannelSocketFactory>,
        config: LinkConfig,
    ) -> Self {
        Self {
            adapter,
            channels,
            config,
        }
    }

    /// Open a transport to a bonded device.
    pub async fn connect(&self, device: &RemoteDevice) -> Result<Transport, ConnectError> {
        let address = device.address();

        if self.adapter.is_discovering().await {
            debug!("Cancelling discovery before connecting to {}", address);
            if let Err(e) = self.adapter.cancel_discovery().await {
                debug!("Ignoring cancel_discovery failure: {}", e);
            }
        }

        let mut attempts = 0;

        if self.channels.is_supported() {
            for attempt in &self.config.channel_attempts {
                attempts += 1;
                if let Some(transport) = self.try_channel(device, *attempt).await {
                    return Ok(transport);
                }
            }
        } else {
            info!("Direct RFCOMM channels not supported, using SDP only");
        }

        if let Some(transport) = self.try_sdp(device, &mut attempts).await {
            return Ok(transport);
        }

        warn!(
            "No SPP channel or UUID reachable on {} after {} attempt(s)",
            address, attempts
        );
        Err(ConnectError::NoChannelAvailable { attempts })
    }

    async fn try_channel(
        &self,
        device: &RemoteDevice,
        attempt: ChannelAttempt,
    ) -> Option<Transport> {
        let address = device.address();
        info!(
            "Trying RFCOMM channel {} on {} ({:?})",
            attempt.channel,
            address,
            attempt.timeout()
        );

        let sockets = async {
            for security in SECURITY_ORDER {
                match self
                    .channels
                    .connect_channel(address, attempt.channel, security)
                    .await
                {
                    Ok(io) => return Some((security, io)),
                    Err(e) => debug!(
                        "Channel {} ({}) on {} failed: {}",
                        attempt.channel,
                        security.as_str(),
                        address,
                        e
                    ),
                }
            }
            None
        };

        match tokio::time::timeout(attempt.timeout(), sockets).await {
            Ok(Some((security, io))) => {
                let route = ConnectRoute::Channel {
                    channel: attempt.channel,
                    security,
                };
                info!("Connected to {} via {}", address, route);
                Some(Transport::new(device.clone(), route, io))
            }
            Ok(None) => {
                warn!("RFCOMM channel {} refused by {}", attempt.channel, address);
                None
            }
            Err(_) => {
                warn!(
                    "RFCOMM channel {} on {} timed out after {:?}",
                    attempt.channel,
                    address,
                    attempt.timeout()
                );
                None
            }
        }
    }

    async fn try_sdp(&self, device: &RemoteDevice, attempts: &mut usize) -> Option<Transport> {
        let address = device.address();

        if let Err(e) = self.adapter.fetch_uuids_with_sdp(address).await {
            warn!("SDP fetch for {} failed, skipping UUID lookup: {}", address, e);
            return None;
        }

        let rounds = self.config.sdp_attempts;
        for round in 1..=rounds {
            let uuids = match self.adapter.service_uuids(address).await {
                Ok(uuids) => uuids,
                Err(e) => {
                    debug!("Reading UUIDs of {} failed: {}", address, e);
                    Vec::new()
                }
            };

            let candidates: Vec<Uuid> = uuids
                .into_iter()
                .filter(|uuid| uuid_has_prefix(uuid, &self.config.spp_uuid_prefix))
                .collect();

            if candidates.is_empty() {
                debug!("No SPP UUID on {} yet (round {}/{})", address, round, rounds);
            }

            for uuid in candidates {
                for security in SECURITY_ORDER {
                    *attempts += 1;
                    if let Some(io) = self.try_service(device, uuid, security).await {
                        let route = ConnectRoute::Service { uuid, security };
                        info!("Connected to {} via {}", address, route);
                        return Some(Transport::new(device.clone(), route, io));
                    }
                }
            }

            if round < rounds {
                tokio::time::sleep(self.config.sdp_retry_interval()).await;
            }
        }

        None
    }

    async fn try_service(
        &self,
        device: &RemoteDevice,
        uuid: Uuid,
        security: SocketSecurity,
    ) -> Option<BoxedIo> {
        let address = device.address();
        let timeout: Duration = self.config.sdp_connect_timeout();
        info!(
            "Trying SDP service {} ({}) on {}",
            uuid,
            security.as_str(),
            address
        );

        match tokio::time::timeout(
            timeout,
            self.adapter.connect_service(address, uuid, security),
        )
        .await
        {
            Ok(Ok(io)) => Some(io),
            Ok(Err(e)) => {
                warn!(
                    "Service {} ({}) on {} failed: {}",
                    uuid,
                    security.as_str(),
                    address,
                    e
                );
                None
            }
            Err(_) => {
                warn!(
                    "Service {} ({}) on {} timed out after {:?}",
                    uuid,
                    security.as_str(),
                    address,
                    timeout
                );
                None
            }
        }
    }
}
