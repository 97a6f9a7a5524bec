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

//! Established RFCOMM transport.

use std::fmt;
use tokio::io::{ReadHalf, WriteHalf};
use uuid::Uuid;

use super::device::RemoteDevice;
use super::platform::{BoxedIo, SocketSecurity};

/// How a transport was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectRoute {
    Channel {
        channel: u8,
        security: SocketSecurity,
    },
    Service {
        uuid: Uuid,
        security: SocketSecurity,
    },
}

impl fmt::Display for ConnectRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectRoute::Channel { channel, security } => {
                write!(f, "channel {} ({})", channel, security.as_str())
            }
            ConnectRoute::Service { uuid, security } => {
                write!(f, "service {} ({})", uuid, security.as_str())
            }
        }
    }
}

/// An open, connected RFCOMM stream to one device.
pub struct Transport {
    device: RemoteDevice,
    route: ConnectRoute,
    io: BoxedIo,
}

impl Transport {
    pub fn new(device: RemoteDevice, route: ConnectRoute, io: BoxedIo) -> Self {
        Self { device, route, io }
    }

    pub fn device(&self) -> &RemoteDevice {
        &self.device
    }

    pub fn route(&self) -> ConnectRoute {
        self.route
    }

    /// Split into the inbound source and outbound sink.
    pub fn into_split(self) -> (RemoteDevice, ReadHalf<BoxedIo>, WriteHalf<BoxedIo>) {
        let (reader, writer) = tokio::io::split(self.io);
        (self.device, reader, writer)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("device", &self.device.address())
            .field("route", &self.route)
            .finish()
    }
}
