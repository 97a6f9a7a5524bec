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

//! Serializable shapes handed to the plugin bridge.

use serde::{Deserialize, Serialize};

use super::device::RemoteDevice;
use super::error::SppError;

/// Name and address of a device, as listed by scans and connection queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub address: String,
}

impl From<&RemoteDevice> for DeviceInfo {
    fn from(device: &RemoteDevice) -> Self {
        Self {
            name: device.name().map(str::to_string),
            address: device.address().to_string(),
        }
    }
}

/// Success flag plus optional error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResult {
    pub ret: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl ConnectResult {
    pub fn ok() -> Self {
        Self {
            ret: true,
            err: None,
        }
    }

    pub fn failed(err: impl ToString) -> Self {
        Self {
            ret: false,
            err: Some(err.to_string()),
        }
    }
}

impl<T> From<Result<T, SppError>> for ConnectResult {
    fn from(result: Result<T, SppError>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::failed(e),
        }
    }
}
