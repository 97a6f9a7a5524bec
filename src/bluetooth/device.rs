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

//! Remote device identity and bond state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::SppError;

/// A Bluetooth device address (BD_ADDR).
///
/// Parses `AA:BB:CC:DD:EE:FF` in either case, and also accepts `-` as the
/// separator. Always displays in upper-case colon form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress([u8; 6]);

impl DeviceAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for DeviceAddress {
    type Err = SppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SppError::InvalidAddress(s.to_string());
        let trimmed = s.trim();
        let separator = if trimmed.contains('-') { '-' } else { ':' };

        let mut bytes = [0u8; 6];
        let mut parts = trimmed.split(separator);
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self(bytes))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Security bond state of a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondState {
    NotBonded,
    Bonding,
    Bonded,
}

impl BondState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BondState::NotBonded => "Not bonded",
            BondState::Bonding => "Bonding...",
            BondState::Bonded => "Bonded",
        }
    }
}

/// A remote Bluetooth Classic device.
///
/// Identity never changes after construction. `bond_state` is only updated
/// by the bond coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDevice {
    address: DeviceAddress,
    name: Option<String>,
    pub(crate) bond_state: BondState,
    discovered_at: Option<DateTime<Utc>>,
}

impl RemoteDevice {
    /// Create a device record supplied directly by a caller or a platform lookup.
    pub fn new(address: DeviceAddress, name: Option<String>, bond_state: BondState) -> Self {
        Self {
            address,
            name,
            bond_state,
            discovered_at: None,
        }
    }

    /// Create a device record for a scan result, stamped with the discovery time.
    pub fn discovered(address: DeviceAddress, name: Option<String>, bond_state: BondState) -> Self {
        Self {
            address,
            name,
            bond_state,
            discovered_at: Some(Utc::now()),
        }
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn bond_state(&self) -> BondState {
        self.bond_state
    }

    pub fn discovered_at(&self) -> Option<DateTime<Utc>> {
        self.discovered_at
    }

    pub fn is_bonded(&self) -> bool {
        self.bond_state == BondState::Bonded
    }
}
